//! Transcript sink: append-only copy of everything the child prints.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Open transcript file, written for the lifetime of the session.
#[derive(Debug)]
pub struct Transcript {
    file: File,
    path: PathBuf,
}

impl Transcript {
    /// Open `path` for appending, creating it owner-only if needed.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o600)
            .open(path)?;
        log::debug!("Transcript opened at {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append bytes. A failing transcript never stops the session.
    pub fn append(&mut self, bytes: &[u8]) {
        if let Err(e) = self.file.write_all(bytes) {
            log::warn!("Failed to write transcript {}: {}", self.path.display(), e);
        }
    }
}

impl AsRawFd for Transcript {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
