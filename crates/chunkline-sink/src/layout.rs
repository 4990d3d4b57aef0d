//! Object key layout and warehouse table naming

use std::fmt;

use chunkline_core::{DayKey, StreamId};

pub const CONTRACTS_PREFIX: &str = "contracts";
pub const MARKER_PREFIX: &str = "config/contracts/lastSafedBlock";

/// `contracts/<contract>_<slug>/csv/<DD_MM_YYYY>.csv`
pub fn csv_key(stream: &StreamId, day: DayKey) -> String {
    format!("{CONTRACTS_PREFIX}/{}/csv/{}.csv", stream.slug(), day.stamp())
}

/// `contracts/<contract>_<slug>/parquet/<DD_MM_YYYY>.parquet`
pub fn parquet_key(stream: &StreamId, day: DayKey) -> String {
    format!(
        "{CONTRACTS_PREFIX}/{}/parquet/{}.parquet",
        stream.slug(),
        day.stamp()
    )
}

/// Single overwritten object holding the last persisted block number
pub fn marker_key(stream: &StreamId) -> String {
    format!("{MARKER_PREFIX}/{}.txt", stream.slug())
}

/// Warehouse destination: dataset named after the contract, table after the method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn for_stream(stream: &StreamId) -> Self {
        Self {
            dataset: stream.contract.clone(),
            table: stream.method.name().to_string(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}
