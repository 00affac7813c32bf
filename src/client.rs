use crate::device::InputSink;
use crate::error::{Error, Result};
use crate::protocol::{EventRecord, EventType};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Overrides the daemon socket location for both daemon and client
pub const SOCKET_ENV: &str = "UINJECT_SOCKET";
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/.uinject_socket";

pub fn default_socket_path() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Sends raw event records to a running daemon.
///
/// Fire and forget: the daemon never answers, so a successful write only
/// means the record reached the socket buffer.
pub struct DaemonClient {
    stream: UnixStream,
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&socket_path).map_err(|e| Error::io("connect", e))?;

        debug!("Connected to daemon at {}", socket_path.display());

        Ok(Self {
            stream,
            socket_path,
        })
    }

    pub fn connect_default() -> Result<Self> {
        Self::connect(default_socket_path())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl InputSink for DaemonClient {
    fn emit_raw(&mut self, event_type: EventType, code: u16, value: i32) -> Result<()> {
        let record = EventRecord::new(event_type, code, value);
        trace!("send {}", record);
        self.stream
            .write_all(&record.to_bytes())
            .map_err(|e| Error::io("send", e))
    }
}
