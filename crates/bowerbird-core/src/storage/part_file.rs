//! Append-mode `.part` file owned by the worker running a task.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::temp_path;

/// In-progress download file. The handle closes on drop, so every early
/// return of the transfer loop releases it.
#[derive(Debug)]
pub struct PartFile {
    file: File,
    temp_path: PathBuf,
    len: u64,
}

impl PartFile {
    /// Create parent directories of `final_path` and open (or create)
    /// `final_path.part` for appending. `len()` is the resume offset.
    pub fn open_append(final_path: &Path) -> io::Result<Self> {
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp_path = temp_path(final_path);
        let file = File::options()
            .create(true)
            .append(true)
            .open(&temp_path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            temp_path,
            len,
        })
    }

    /// Bytes currently in the file.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Append a chunk.
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    /// Drop everything written so far (server ignored or rejected our Range).
    pub fn truncate(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.len = 0;
        Ok(())
    }

    /// Flush file data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Close the handle and atomically rename the `.part` file to `final_path`.
    /// This is the only place a download becomes visible under its final name.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let PartFile {
            file, temp_path, ..
        } = self;
        drop(file);
        fs::rename(&temp_path, final_path)
    }
}
