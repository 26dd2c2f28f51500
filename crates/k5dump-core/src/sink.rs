//! Destinations for a finished dump.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives the complete dump exactly once.
pub trait DumpSink {
    fn persist(&mut self, data: &[u8]) -> io::Result<()>;
}

impl DumpSink for Vec<u8> {
    fn persist(&mut self, data: &[u8]) -> io::Result<()> {
        self.clear();
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Writes the dump to a file via a temporary sibling and a rename, so a
/// failed write never leaves a partial file under the final name.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".part");
        self.path.with_file_name(name)
    }
}

impl DumpSink for FileSink {
    fn persist(&mut self, data: &[u8]) -> io::Result<()> {
        let tmp = self.temp_path();
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        info!(path = %self.path.display(), bytes = data.len(), "Data saved");
        Ok(())
    }
}
