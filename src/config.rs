use crate::client::default_socket_path;
use crate::device::DeviceOptions;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SOCKET_MODE: u32 = 0o666;
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Daemon settings, read from a JSON file. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    /// Permission bits applied to the socket after binding
    pub socket_mode: u32,
    pub max_connections: usize,
    pub device: DeviceOptions,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            socket_mode: DEFAULT_SOCKET_MODE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            device: DeviceOptions::default(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Argument(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Argument(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Argument("max_connections must be at least 1".into()));
        }
        if self.socket_mode > 0o777 {
            return Err(Error::Argument(format!(
                "socket_mode {:o} is not a permission mask",
                self.socket_mode
            )));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::Argument("socket_path is empty".into()));
        }
        Ok(())
    }
}
