//! Registered warehouse schemas for known event methods

use chunkline_core::StreamId;

/// Warehouse column type, as declared by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    String,
    /// Unsigned 256-bit amount. Up to 78 digits, wider than any DuckDB
    /// DECIMAL (38 digits), so it is stored as decimal text.
    BigNumeric,
}

impl ColumnType {
    /// DuckDB type the column is created with
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::String => "VARCHAR",
            Self::BigNumeric => "VARCHAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

use ColumnType::{BigNumeric, Integer, String as Str};

/// Approval events, and Transfer on `bnb`
pub static TRANSFER_LIKE: &[Column] = &[
    col("timestamp", Integer),
    col("blocknumber", Integer),
    col("txhash", Str),
    col("txindex", Integer),
    col("logindex", Integer),
    col("txfrom", Str),
    col("txto", Str),
    col("txvalue", Str),
    col("gas_price", Integer),
    col("gas_used", Integer),
];

pub static SWAP: &[Column] = &[
    col("timestamp", Integer),
    col("blocknumber", Integer),
    col("txhash", Str),
    col("txindex", Integer),
    col("logindex", Integer),
    col("recipient", Str),
    col("ptorn", Integer),
    col("torn", BigNumeric),
    col("gas_price", Integer),
    col("gas_used", Integer),
];

/// Explicit schema for a stream, if one is registered.
///
/// Method names compare case-insensitively; contract names exactly.
pub fn table_schema(stream: &StreamId) -> Option<&'static [Column]> {
    match (stream.contract.as_str(), stream.method.slug().as_str()) {
        (_, "approval") => Some(TRANSFER_LIKE),
        ("bnb", "transfer") => Some(TRANSFER_LIKE),
        (_, "swap") => Some(SWAP),
        _ => None,
    }
}

pub fn column_names(schema: &[Column]) -> Vec<String> {
    schema.iter().map(|c| c.name.to_string()).collect()
}
