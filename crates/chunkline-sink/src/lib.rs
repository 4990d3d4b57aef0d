//! Chunkline Sink - persistence of flushed days
//!
//! [`SinkAdapter`] implements [`chunkline_core::DaySink`]: each flushed day is
//! written as CSV and Parquet objects, optionally appended to a DuckDB
//! warehouse, and finally recorded in the stream's position marker.

pub mod adapter;
pub mod encode;
pub mod error;
pub mod layout;
pub mod retry;
pub mod schema;
pub mod store;
pub mod warehouse;

pub use adapter::{
    FlushReport, SinkAdapter, SinkConfig, SinkStats, WarehouseOutcome, WarehousePolicy,
    read_marker,
};
pub use error::SinkError;
pub use layout::TableId;
pub use retry::RetryPolicy;
pub use schema::{Column, ColumnType, table_schema};
pub use store::{LocalStore, ObjectStore, S3Store, StoreRef, create_store};
pub use warehouse::{DuckDbWarehouse, Warehouse};
