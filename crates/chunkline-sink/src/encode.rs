//! Day chunk → Arrow RecordBatch → CSV / Parquet bytes

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chunkline_core::{Record, Value};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::SinkError;

/// Column kind inferred from the values present in a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inferred {
    Null,
    Int,
    Float,
    Text,
}

impl Inferred {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Text(_) => Self::Text,
        }
    }

    fn widen(self, other: Self) -> Self {
        use Inferred::*;
        match (self, other) {
            (Null, x) | (x, Null) => x,
            (Int, Int) => Int,
            (Int | Float, Int | Float) => Float,
            _ => Text,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Null | Self::Text => DataType::Utf8,
        }
    }

    /// DuckDB type used when a table has no registered schema
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Int => "BIGINT",
            Self::Float => "DOUBLE",
            Self::Null | Self::Text => "VARCHAR",
        }
    }
}

/// Fold every record's value at `col` into one kind
pub fn infer_column(records: &[Record], col: usize) -> Inferred {
    records
        .iter()
        .filter_map(|r| r.get(col))
        .fold(Inferred::Null, |acc, v| acc.widen(Inferred::of(v)))
}

/// Every record must have exactly `expected` fields
pub fn check_arity(records: &[Record], expected: usize) -> Result<(), SinkError> {
    match records.iter().position(|r| r.len() != expected) {
        Some(index) => Err(SinkError::Header {
            index,
            expected,
            found: records[index].len(),
        }),
        None => Ok(()),
    }
}

/// Build a RecordBatch with one column per header name
pub fn to_record_batch(header: &[String], records: &[Record]) -> Result<RecordBatch, SinkError> {
    check_arity(records, header.len())?;

    let mut fields = Vec::with_capacity(header.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(header.len());
    for (col, name) in header.iter().enumerate() {
        let kind = infer_column(records, col);
        fields.push(Field::new(name, kind.data_type(), true));
        columns.push(build_column(records, col, kind));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

fn build_column(records: &[Record], col: usize, kind: Inferred) -> ArrayRef {
    let values = records.iter().map(|r| r.get(col).unwrap_or(&Value::Null));
    match kind {
        Inferred::Int => Arc::new(
            values
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        Inferred::Float => Arc::new(
            values
                .map(|v| match v {
                    Value::Int(i) => Some(*i as f64),
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        Inferred::Null | Inferred::Text => Arc::new(
            values
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect::<StringArray>(),
        ),
    }
}

/// CSV with a header row, no index column
pub fn encode_csv(batch: &RecordBatch) -> Result<Vec<u8>, SinkError> {
    let mut buf = Vec::new();
    {
        let mut writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .build(&mut buf);
        writer.write(batch)?;
    }
    Ok(buf)
}

/// Zstd-compressed Parquet file held in memory
pub fn encode_parquet(batch: &RecordBatch, zstd_level: i32) -> Result<Vec<u8>, SinkError> {
    let level = ZstdLevel::try_new(zstd_level)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .set_max_row_group_size(1024 * 1024)
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buf)
}
