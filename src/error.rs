use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The uinput node exists but this process may not write to it.
    #[error("no write access to {path:?}; try running as root or via the daemon")]
    Permission { path: PathBuf },

    /// Kernel support for uinput is missing.
    #[error("uinput is not available: {0}")]
    Configuration(String),

    #[error("{op} failed: {source}")]
    DeviceIo {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    /// A wire record that does not decode to a known event type.
    #[error("malformed event record: {0}")]
    Protocol(String),
}

impl Error {
    pub(crate) fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::DeviceIo { op, source }
    }

    pub(crate) fn last_os(op: &'static str) -> Self {
        Self::io(op, std::io::Error::last_os_error())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
