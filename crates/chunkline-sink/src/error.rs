//! Error type for day flushes

use std::fmt;

/// Failure while persisting one day chunk.
///
/// Every variant aborts the flush; [`is_retryable`](SinkError::is_retryable)
/// tells the retry loop whether another attempt can help.
#[derive(Debug)]
pub enum SinkError {
    /// Object store answered with an error (HTTP status when known)
    Store {
        key: String,
        status: Option<u16>,
        message: String,
    },
    Io(std::io::Error),
    /// Object key escapes the store root
    InvalidKey(String),
    /// Arrow / CSV / Parquet encoding failed
    Encode(String),
    Warehouse(String),
    /// Record arity differs from the declared header
    Header {
        index: usize,
        expected: usize,
        found: usize,
    },
    /// Position-marker column of the last record is not an integer
    Marker(String),
    /// Stream destination is misconfigured
    Config(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store {
                key,
                status: Some(s),
                message,
            } => write!(f, "store {key}: HTTP {s}: {message}"),
            Self::Store {
                key,
                status: None,
                message,
            } => write!(f, "store {key}: {message}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::InvalidKey(key) => write!(f, "invalid object key: {key}"),
            Self::Encode(msg) => write!(f, "encode: {msg}"),
            Self::Warehouse(msg) => write!(f, "warehouse: {msg}"),
            Self::Header {
                index,
                expected,
                found,
            } => write!(
                f,
                "record {index} has {found} fields, header declares {expected}"
            ),
            Self::Marker(msg) => write!(f, "position marker: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        match self {
            // 4xx are request problems, except timeout and throttling
            Self::Store {
                status: Some(s), ..
            } => !(400..500).contains(s) || matches!(s, 408 | 429),
            Self::Store { status: None, .. } => true,
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
            Self::InvalidKey(_)
            | Self::Encode(_)
            | Self::Warehouse(_)
            | Self::Header { .. }
            | Self::Marker(_)
            | Self::Config(_) => false,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<arrow::error::ArrowError> for SinkError {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for SinkError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<duckdb::Error> for SinkError {
    fn from(e: duckdb::Error) -> Self {
        Self::Warehouse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    fn store_err(status: Option<u16>) -> SinkError {
        SinkError::Store {
            key: "contracts/x.csv".to_string(),
            status,
            message: "test".to_string(),
        }
    }

    #[test]
    fn store_403_not_retryable() {
        assert!(!store_err(Some(403)).is_retryable());
    }

    #[test]
    fn store_500_retryable() {
        assert!(store_err(Some(500)).is_retryable());
        assert!(store_err(Some(503)).is_retryable());
    }

    #[test]
    fn store_throttling_retryable() {
        assert!(store_err(Some(429)).is_retryable());
        assert!(store_err(Some(408)).is_retryable());
    }

    #[test]
    fn store_without_status_retryable() {
        assert!(store_err(None).is_retryable());
    }

    #[test]
    fn io_storage_full_not_retryable() {
        let err = SinkError::Io(std::io::Error::new(ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_other_retryable() {
        let err = SinkError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "pipe"));
        assert!(err.is_retryable());
    }

    #[test]
    fn data_errors_not_retryable() {
        let err = SinkError::Header {
            index: 0,
            expected: 10,
            found: 9,
        };
        assert!(!err.is_retryable());
        assert!(!SinkError::Encode("x".into()).is_retryable());
        assert!(!SinkError::Warehouse("x".into()).is_retryable());
    }

    #[test]
    fn display_store_with_status() {
        let msg = store_err(Some(503)).to_string();
        assert!(msg.contains("HTTP 503"));
        assert!(msg.contains("contracts/x.csv"));
    }
}
