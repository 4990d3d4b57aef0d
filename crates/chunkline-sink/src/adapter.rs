//! Persists one flushed day to every configured backend

use std::fmt;

use chunkline_core::{DayChunk, DayKey, DaySink, StreamId};

use crate::encode;
use crate::error::SinkError;
use crate::layout::{self, TableId};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::schema::{self, Column};
use crate::store::{ObjectStore, StoreRef};
use crate::warehouse::Warehouse;

/// Whether a failed warehouse append fails the whole flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarehousePolicy {
    /// Log and continue; the object-store copy is authoritative
    #[default]
    BestEffort,
    Required,
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Column names; empty means "take them from the schema registry"
    pub header: Vec<String>,
    /// Header column whose last value becomes the position marker
    pub marker_column: String,
    pub zstd_level: i32,
    pub retry: RetryPolicy,
    pub warehouse_policy: WarehousePolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            header: Vec::new(),
            marker_column: "blocknumber".to_string(),
            zstd_level: 3,
            retry: RetryPolicy::default(),
            warehouse_policy: WarehousePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseOutcome {
    Disabled,
    Appended(usize),
    /// Best-effort append failed; the message was logged
    Failed(String),
}

impl fmt::Display for WarehouseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Appended(n) => write!(f, "{n} rows"),
            Self::Failed(msg) => write!(f, "failed ({msg})"),
        }
    }
}

/// What one successful day flush wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub day: DayKey,
    pub seq: u64,
    pub records: usize,
    pub csv_key: String,
    pub parquet_key: String,
    pub warehouse: WarehouseOutcome,
    pub marker_block: i64,
}

/// Running totals for one stream's sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub days: usize,
    pub records: usize,
    pub bytes_written: usize,
    pub warehouse_failures: usize,
}

/// Writes a day as CSV, then Parquet, then the warehouse append, then the
/// position marker. The marker goes last: once it moves, everything up to it
/// is durable.
pub struct SinkAdapter {
    stream: StreamId,
    store: StoreRef,
    warehouse: Option<Box<dyn Warehouse>>,
    config: SinkConfig,
    header: Vec<String>,
    marker_idx: usize,
    schema: Option<&'static [Column]>,
    table: TableId,
    last_report: Option<FlushReport>,
    stats: SinkStats,
}

impl SinkAdapter {
    /// Resolve the header (configured, else registered schema) and the marker column.
    pub fn new(stream: StreamId, store: StoreRef, config: SinkConfig) -> Result<Self, SinkError> {
        let schema = schema::table_schema(&stream);
        let header = if !config.header.is_empty() {
            config.header.clone()
        } else if let Some(schema) = schema {
            schema::column_names(schema)
        } else {
            return Err(SinkError::Config(format!(
                "{stream}: no header configured and no registered schema"
            )));
        };

        let marker_idx = header
            .iter()
            .position(|h| *h == config.marker_column)
            .ok_or_else(|| {
                SinkError::Config(format!(
                    "{stream}: marker column '{}' not in header",
                    config.marker_column
                ))
            })?;

        Ok(Self {
            table: TableId::for_stream(&stream),
            stream,
            store,
            warehouse: None,
            config,
            header,
            marker_idx,
            schema,
            last_report: None,
            stats: SinkStats::default(),
        })
    }

    pub fn with_warehouse(mut self, warehouse: Box<dyn Warehouse>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn marker_column_index(&self) -> usize {
        self.marker_idx
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn last_report(&self) -> Option<&FlushReport> {
        self.last_report.as_ref()
    }

    /// Last block number persisted for this stream
    pub fn read_marker(&self) -> Result<Option<i64>, SinkError> {
        read_marker(self.store.as_ref(), &self.stream)
    }

    /// Persist one day chunk. Any error leaves the marker where it was.
    pub fn flush_day(&mut self, chunk: &DayChunk<'_>) -> Result<FlushReport, SinkError> {
        if chunk.stream != &self.stream {
            return Err(SinkError::Config(format!(
                "chunk of {} sent to sink of {}",
                chunk.stream, self.stream
            )));
        }

        // Validate everything before the first write
        let marker_block = self.marker_value(chunk)?;
        let batch = encode::to_record_batch(&self.header, chunk.records)?;
        let csv = encode::encode_csv(&batch)?;
        let parquet = encode::encode_parquet(&batch, self.config.zstd_level)?;

        let csv_key = layout::csv_key(&self.stream, chunk.day);
        let parquet_key = layout::parquet_key(&self.stream, chunk.day);
        self.put(&csv_key, csv)?;
        self.put(&parquet_key, parquet)?;

        let warehouse = self.append_warehouse(chunk)?;

        self.put(
            &layout::marker_key(&self.stream),
            marker_block.to_string().into_bytes(),
        )?;

        self.stats.days += 1;
        self.stats.records += chunk.len();
        log::debug!(
            "{}: day {} persisted ({} records, warehouse {warehouse}, marker {marker_block})",
            self.stream,
            chunk.day,
            chunk.len()
        );

        Ok(FlushReport {
            day: chunk.day,
            seq: chunk.seq,
            records: chunk.len(),
            csv_key,
            parquet_key,
            warehouse,
            marker_block,
        })
    }

    fn marker_value(&self, chunk: &DayChunk<'_>) -> Result<i64, SinkError> {
        let last = chunk
            .last()
            .ok_or_else(|| SinkError::Marker(format!("empty chunk for {}", chunk.day)))?;
        let value = last.get(self.marker_idx).ok_or_else(|| SinkError::Header {
            index: chunk.len() - 1,
            expected: self.header.len(),
            found: last.len(),
        })?;
        value.as_integer().ok_or_else(|| {
            SinkError::Marker(format!(
                "'{}' of the last record is not an integer: {value}",
                self.config.marker_column
            ))
        })
    }

    fn put(&mut self, key: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let len = body.len();
        retry_with_backoff(key, self.config.retry, || self.store.put(key, body.clone()))?;
        self.stats.bytes_written += len;
        log::trace!("put {key} ({len} bytes)");
        Ok(())
    }

    fn append_warehouse(&mut self, chunk: &DayChunk<'_>) -> Result<WarehouseOutcome, SinkError> {
        let Some(warehouse) = self.warehouse.as_mut() else {
            return Ok(WarehouseOutcome::Disabled);
        };
        match warehouse.append(&self.table, chunk.day, &self.header, self.schema, chunk.records) {
            Ok(n) => Ok(WarehouseOutcome::Appended(n)),
            Err(e) if self.config.warehouse_policy == WarehousePolicy::BestEffort => {
                log::warn!("{}: warehouse append for {} failed: {e}", self.table, chunk.day);
                self.stats.warehouse_failures += 1;
                Ok(WarehouseOutcome::Failed(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

impl DaySink for SinkAdapter {
    type Error = SinkError;

    fn flush(&mut self, chunk: &DayChunk<'_>) -> Result<(), Self::Error> {
        let report = self.flush_day(chunk)?;
        self.last_report = Some(report);
        Ok(())
    }
}

/// Read a stream's position marker straight from a store
pub fn read_marker(store: &dyn ObjectStore, stream: &StreamId) -> Result<Option<i64>, SinkError> {
    let Some(bytes) = store.get(&layout::marker_key(stream))? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes);
    text.trim()
        .parse()
        .map(Some)
        .map_err(|_| SinkError::Marker(format!("{stream}: stored marker '{}' is not a number", text.trim())))
}
