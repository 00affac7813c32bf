use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Exclusive flock held for the daemon's lifetime, so a second daemon cannot
/// unlink the socket of a running one.
pub struct LockFile {
    path: PathBuf,
    _file: File,
}

impl LockFile {
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("Another daemon already holds {}", path.display()),
            )
            .into());
        }

        tracing::debug!("Acquired lock file: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        tracing::debug!("Released lock file: {}", self.path.display());
    }
}
