use super::{decode, encode, OrderStore, StoreLock};
use crate::error::Result;
use crate::models::StopLossOrder;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Orders as one pretty-printed JSON array on disk
///
/// Saves go to a uniquely named temp file in the same directory that is
/// fsynced and renamed over the target, so a crash mid-write leaves the
/// previous snapshot readable. Writers in separate processes coordinate
/// through an advisory lock on a sibling `.lock` file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Directory holding the file, created if missing
    fn ensure_dir(&self) -> std::io::Result<&Path> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                Ok(parent)
            }
            _ => Ok(Path::new(".")),
        }
    }

    fn write_temp(&self, dir: &Path, contents: &[u8]) -> std::io::Result<NamedTempFile> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".orders-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

impl OrderStore for JsonFileStore {
    fn load(&self) -> Result<Vec<StopLossOrder>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => decode(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, orders: &[StopLossOrder]) -> Result<()> {
        let json = encode(orders)?;
        let dir = self.ensure_dir()?;

        // An unpersisted temp file deletes itself on drop
        let tmp = self.write_temp(dir, json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = %self.path.display(), orders = orders.len(), "Saved orders");
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock> {
        self.ensure_dir()?;
        let file: File = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        FileExt::lock_exclusive(&file)?;

        tracing::trace!(path = %self.path.display(), "Acquired store lock");

        // Closing the handle releases the lock
        Ok(StoreLock::holding(file))
    }
}
