use crate::config::DaemonConfig;
use crate::device::{DeviceBackend, VirtualInputDevice};
use crate::protocol::EventRecord;
use crate::uinput::UinputBackend;
use anyhow::Context;
use std::ffi::OsString;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};
use ulid::Ulid;

mod lock;
mod writer;

pub use lock::LockFile;
use writer::Batch;

/// Records buffered for one connection before a batch is sent regardless of
/// whether a SYN_REPORT has arrived
pub const MAX_BATCH_RECORDS: usize = 1024;

/// Batches queued between the connection handlers and the device writer
const CHANNEL_CAPACITY: usize = 256;

/// Accepts raw event records on a Unix socket and replays them on the
/// virtual device.
pub struct DaemonServer<B: DeviceBackend + 'static = UinputBackend> {
    config: DaemonConfig,
    listener: UnixListener,
    device: VirtualInputDevice<B>,
    /// Held until the server is dropped
    _lock_file: LockFile,
}

impl<B: DeviceBackend + 'static> DaemonServer<B> {
    /// Lock, clean up and bind the socket. Must be called inside a Tokio
    /// runtime.
    pub fn bind(config: DaemonConfig, device: VirtualInputDevice<B>) -> anyhow::Result<Self> {
        config.validate()?;
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let lock_file = LockFile::acquire(&lock_path(socket_path))?;

        // Only a stale socket can be left behind once the lock is ours
        match std::fs::remove_file(socket_path) {
            Ok(()) => debug!("Removed stale socket {}", socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove {}", socket_path.display()));
            }
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

        std::fs::set_permissions(
            socket_path,
            std::fs::Permissions::from_mode(config.socket_mode),
        )
        .with_context(|| format!("Failed to chmod {}", socket_path.display()))?;

        info!(
            "Daemon listening on {} (mode {:o})",
            socket_path.display(),
            config.socket_mode
        );

        Ok(Self {
            config,
            listener,
            device,
            _lock_file: lock_file,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Open connections are then dropped without draining, the device is
    /// destroyed and the socket file removed.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let Self {
            config,
            listener,
            device,
            _lock_file,
        } = self;

        let (batches, rx) = mpsc::channel::<Batch>(CHANNEL_CAPACITY);
        let writer = tokio::task::spawn_blocking(move || writer::drain(device, rx));

        let permits = Arc::new(Semaphore::new(config.max_connections));
        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let Ok(permit) = permits.clone().try_acquire_owned() else {
                            warn!(
                                "Connection limit of {} reached, dropping client",
                                config.max_connections
                            );
                            continue;
                        };

                        let batches = batches.clone();
                        let session = Ulid::new();
                        handlers.spawn(async move {
                            let _permit = permit;
                            debug!("[{}] Client connected", session);
                            match handle_client(stream, batches, session).await {
                                Ok(forwarded) => {
                                    debug!("[{}] Client disconnected after {} records", session, forwarded)
                                }
                                Err(e) => warn!("[{}] Closing connection: {:#}", session, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Client handler panicked: {}", e);
                    }
                }
            }
        }

        handlers.shutdown().await;
        drop(batches);
        drop(listener);

        let written = writer.await.context("Event writer panicked")?;
        debug!("Writer finished with {} events", written);

        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            warn!("Failed to remove {}: {}", config.socket_path.display(), e);
        }
        info!("Daemon stopped");
        Ok(())
    }
}

fn lock_path(socket_path: &Path) -> PathBuf {
    let mut path = OsString::from(socket_path.as_os_str());
    path.push(".lock");
    PathBuf::from(path)
}

/// Fill `buf` from the stream. Returns how many bytes arrived before EOF;
/// anything short of `buf.len()` means the peer went away.
async fn read_record<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8; EventRecord::WIRE_SIZE],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Forward one client's records, batched per logical action.
///
/// Returns the number of records forwarded. Complete records still pending
/// when the connection ends are forwarded; a trailing partial record is not.
async fn handle_client(
    stream: UnixStream,
    batches: mpsc::Sender<Batch>,
    session: Ulid,
) -> anyhow::Result<usize> {
    let mut reader = BufReader::new(stream);
    let mut buf = [0u8; EventRecord::WIRE_SIZE];
    let mut batch: Batch = Vec::new();
    let mut forwarded = 0;

    let outcome = loop {
        let filled = match read_record(&mut reader, &mut buf).await {
            Ok(filled) => filled,
            Err(e) => break Err(anyhow::Error::new(e).context("Failed to read from client")),
        };
        if filled == 0 {
            break Ok(());
        }
        if filled < buf.len() {
            debug!("[{}] Dropping partial record of {} bytes", session, filled);
            break Ok(());
        }

        let record = match EventRecord::from_bytes(&buf) {
            Ok(record) => record,
            Err(e) => break Err(e.into()),
        };
        trace!("[{}] Received {}", session, record);

        let end_of_action = record.is_sync();
        batch.push(record);
        if end_of_action || batch.len() >= MAX_BATCH_RECORDS {
            forwarded += batch.len();
            batches
                .send(std::mem::take(&mut batch))
                .await
                .context("Event writer has stopped")?;
        }
    };

    if !batch.is_empty() {
        forwarded += batch.len();
        batches
            .send(batch)
            .await
            .context("Event writer has stopped")?;
    }

    outcome.map(|()| forwarded)
}
