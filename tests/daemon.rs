use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uinject::keys::codes::*;
use uinject::mock::{BackendCall, RecordingBackend};
use uinject::{
    DaemonClient, DaemonConfig, DaemonServer, DeviceOptions, EventEmitter, EventRecord,
    EventType, VirtualInputDevice, resolve,
};

const WAIT: Duration = Duration::from_secs(5);

struct TestDaemon {
    _dir: TempDir,
    socket: PathBuf,
    backend: RecordingBackend,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestDaemon {
    fn start(max_connections: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run").join("uinject.sock");
        let backend = RecordingBackend::new();
        let device = VirtualInputDevice::with_backend(
            backend.clone(),
            DeviceOptions {
                settle_ms: 0,
                pacing_us: 0,
                ..DeviceOptions::default()
            },
        );
        let config = DaemonConfig {
            socket_path: socket.clone(),
            max_connections,
            ..DaemonConfig::default()
        };

        let server = DaemonServer::bind(config, device).unwrap();
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop.await;
        }));

        Self {
            _dir: dir,
            socket,
            backend,
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.socket).await.unwrap()
    }

    /// Poll until at least `count` events reached the device
    async fn wait_for_writes(&self, count: usize) -> Vec<EventRecord> {
        tokio::time::timeout(WAIT, async {
            loop {
                let written = self.backend.written();
                if written.len() >= count {
                    return written;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {} writes, got {:?}",
                count,
                self.backend.written()
            )
        })
    }

    /// Signal shutdown and wait for the server to finish
    async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        tokio::time::timeout(WAIT, &mut self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

async fn send(stream: &mut UnixStream, records: &[EventRecord]) {
    let bytes: Vec<u8> = records.iter().flat_map(|r| r.to_bytes()).collect();
    stream.write_all(&bytes).await.unwrap();
}

/// True if the daemon closed its end without sending anything
async fn closed_by_daemon(stream: &mut UnixStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(
        tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}

#[tokio::test]
async fn forwards_a_single_record() {
    let mut daemon = TestDaemon::start(4);

    let mut client = daemon.connect().await;
    send(
        &mut client,
        &[EventRecord::new(EventType::Relative, 0x01, -42)],
    )
    .await;
    drop(client);

    let written = daemon.wait_for_writes(1).await;
    assert_eq!(
        written,
        vec![EventRecord::new(EventType::Relative, 0x01, -42)]
    );
    daemon.stop().await;
}

#[tokio::test]
async fn short_read_forwards_nothing() {
    let mut daemon = TestDaemon::start(4);

    let mut partial = daemon.connect().await;
    partial
        .write_all(&EventRecord::key(KEY_A, 1).to_bytes()[..5])
        .await
        .unwrap();
    drop(partial);

    let mut client = daemon.connect().await;
    send(&mut client, &[EventRecord::sync()]).await;

    daemon.wait_for_writes(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(daemon.backend.written(), vec![EventRecord::sync()]);
    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_actions_never_interleave() {
    const CLIENTS: usize = 8;
    const ACTIONS: usize = 50;
    let keys = [KEY_A, KEY_B, KEY_C, KEY_D, KEY_E, KEY_F, KEY_G, KEY_H];

    let mut daemon = TestDaemon::start(CLIENTS);

    let mut clients = Vec::new();
    for &code in keys.iter().take(CLIENTS) {
        let mut stream = daemon.connect().await;
        clients.push(tokio::spawn(async move {
            for _ in 0..ACTIONS {
                let action = [
                    EventRecord::key(code, 1),
                    EventRecord::key(code, 0),
                    EventRecord::sync(),
                ];
                let bytes: Vec<u8> = action.iter().flat_map(|r| r.to_bytes()).collect();
                // Split mid-record so reads straddle action boundaries
                let (head, tail) = bytes.split_at(11);
                stream.write_all(head).await.unwrap();
                tokio::task::yield_now().await;
                stream.write_all(tail).await.unwrap();
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let written = daemon.wait_for_writes(CLIENTS * ACTIONS * 3).await;
    assert_eq!(written.len(), CLIENTS * ACTIONS * 3);

    for triple in written.chunks(3) {
        let code = triple[0].code;
        assert_eq!(triple[0], EventRecord::key(code, 1), "{:?}", triple);
        assert_eq!(triple[1], EventRecord::key(code, 0), "{:?}", triple);
        assert!(triple[2].is_sync(), "{:?}", triple);
    }
    for code in keys {
        let presses = written
            .iter()
            .filter(|r| **r == EventRecord::key(code, 1))
            .count();
        assert_eq!(presses, ACTIONS);
    }

    daemon.stop().await;
}

#[tokio::test]
async fn connections_over_the_cap_are_closed() {
    let mut daemon = TestDaemon::start(1);

    let mut first = daemon.connect().await;
    let mut second = daemon.connect().await;

    assert!(closed_by_daemon(&mut second).await);
    // Writing to a closed peer may fail; either way nothing is forwarded
    let _ = second.write_all(&EventRecord::sync().to_bytes()).await;
    drop(second);

    send(&mut first, &[EventRecord::key(KEY_A, 1), EventRecord::sync()]).await;
    daemon.wait_for_writes(2).await;
    drop(first);

    // The slot frees up once the first client is gone
    let mut third = tokio::time::timeout(WAIT, async {
        loop {
            let mut stream = daemon.connect().await;
            if !closed_by_daemon(&mut stream).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    send(&mut third, &[EventRecord::key(KEY_A, 0), EventRecord::sync()]).await;

    let written = daemon.wait_for_writes(4).await;
    assert_eq!(
        written,
        vec![
            EventRecord::key(KEY_A, 1),
            EventRecord::sync(),
            EventRecord::key(KEY_A, 0),
            EventRecord::sync(),
        ]
    );
    daemon.stop().await;
}

#[tokio::test]
async fn protocol_error_closes_only_that_connection() {
    let mut daemon = TestDaemon::start(4);

    let mut good = daemon.connect().await;
    let mut bad = daemon.connect().await;

    let mut bogus = EventRecord::sync().to_bytes();
    bogus[..2].copy_from_slice(&0x7fffu16.to_ne_bytes());
    bad.write_all(&bogus).await.unwrap();
    assert!(closed_by_daemon(&mut bad).await);

    send(&mut good, &[EventRecord::key(KEY_Z, 1), EventRecord::sync()]).await;
    let written = daemon.wait_for_writes(2).await;
    assert_eq!(written, vec![EventRecord::key(KEY_Z, 1), EventRecord::sync()]);

    daemon.stop().await;
}

#[tokio::test]
async fn shutdown_destroys_device_and_removes_socket() {
    let mut daemon = TestDaemon::start(4);
    let socket = daemon.socket.clone();
    assert!(socket.exists());

    let mut idle = daemon.connect().await;
    let mut active = daemon.connect().await;
    send(&mut active, &[EventRecord::sync()]).await;
    daemon.wait_for_writes(1).await;

    daemon.stop().await;

    let backend = &daemon.backend;
    assert_eq!(backend.count(|c| *c == BackendCall::Destroy), 1);
    assert_eq!(backend.calls().last(), Some(&BackendCall::Close));
    assert!(!socket.exists());
    // Open connections are abandoned, not drained
    assert!(closed_by_daemon(&mut idle).await);
}

#[tokio::test]
async fn second_daemon_on_the_same_socket_is_refused() {
    let mut daemon = TestDaemon::start(4);

    let config = DaemonConfig {
        socket_path: daemon.socket.clone(),
        ..DaemonConfig::default()
    };
    let device = VirtualInputDevice::with_backend(RecordingBackend::new(), DeviceOptions::default());
    assert!(DaemonServer::bind(config, device).is_err());

    // The running daemon still owns a working socket
    let mut client = daemon.connect().await;
    send(&mut client, &[EventRecord::sync()]).await;
    daemon.wait_for_writes(1).await;
    daemon.stop().await;
}

#[tokio::test]
async fn emitter_drives_the_daemon_through_the_client() {
    let mut daemon = TestDaemon::start(4);
    let socket = daemon.socket.clone();

    tokio::task::spawn_blocking(move || {
        let client = DaemonClient::connect(&socket).unwrap();
        let mut emitter = EventEmitter::new(client);
        emitter
            .press_sequence(&resolve("ctrl+alt+F4").unwrap(), Duration::ZERO)
            .unwrap();
        emitter.type_text("Hi", Duration::ZERO).unwrap();
    })
    .await
    .unwrap();

    // 6 chord transitions and 6 typed ones, each with its Sync
    let written = daemon.wait_for_writes(24).await;
    let keys: Vec<(u16, i32)> = written
        .iter()
        .filter(|r| r.event_type == EventType::Key)
        .map(|r| (r.code, r.value))
        .collect();
    assert_eq!(
        keys,
        vec![
            (KEY_LEFTCTRL, 1),
            (KEY_LEFTALT, 1),
            (KEY_F4, 1),
            (KEY_F4, 0),
            (KEY_LEFTALT, 0),
            (KEY_LEFTCTRL, 0),
            (KEY_LEFTSHIFT, 1),
            (KEY_H, 1),
            (KEY_H, 0),
            (KEY_LEFTSHIFT, 0),
            (KEY_I, 1),
            (KEY_I, 0),
        ]
    );
    daemon.stop().await;
}
