//! Object stores holding CSV/Parquet day files and position markers

use std::path::Path;
use std::sync::Arc;

use url::Url;

use crate::error::SinkError;

pub mod local;
pub mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

pub type StoreRef = Arc<dyn ObjectStore>;

/// Blocking key/value object store.
///
/// Shared by every stream of a run, so implementations must be `Send + Sync`.
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object
    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), SinkError>;

    /// Read the object under `key`, `None` if it does not exist
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SinkError>;

    /// Human-readable location, for logs and `chunkline config`
    fn describe(&self) -> String;
}

/// Pick a store by URL scheme: `s3://bucket/prefix`, `file:///path`, or a plain path.
pub fn create_store(url: &str) -> Result<StoreRef, SinkError> {
    match Url::parse(url) {
        Ok(u) if u.scheme() == "s3" => Ok(Arc::new(S3Store::from_url(&u)?)),
        Ok(u) if u.scheme() == "file" => {
            let path = u
                .to_file_path()
                .map_err(|()| SinkError::Config(format!("invalid file url - {url}")))?;
            Ok(Arc::new(LocalStore::new(path)))
        }
        // Windows drive letters parse as a one-letter scheme
        Ok(u) if u.scheme().len() > 1 => Err(SinkError::Config(format!(
            "unsupported protocol - {}",
            u.scheme()
        ))),
        _ => Ok(Arc::new(LocalStore::new(Path::new(url)))),
    }
}

/// Split a key into segments, rejecting anything that could leave the root
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>, SinkError> {
    let segments: Vec<&str> = key.split('/').collect();
    let bad = key.is_empty()
        || key.starts_with('/')
        || segments.iter().any(|s| s.is_empty() || *s == "." || *s == "..");
    if bad {
        return Err(SinkError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}
