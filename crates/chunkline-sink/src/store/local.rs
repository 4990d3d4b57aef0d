use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::{ObjectStore, key_segments};
use crate::error::SinkError;

/// Directory-backed store.
///
/// Writes go to `<name>.tmp` and are renamed into place, so a reader never
/// observes a partial object.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, SinkError> {
        let mut path = self.root.clone();
        path.extend(key_segments(key)?);
        Ok(path)
    }
}

impl ObjectStore for LocalStore {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let path = self.resolve(key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        log::trace!("wrote {}", path.display());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SinkError> {
        match fs::read(self.resolve(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
