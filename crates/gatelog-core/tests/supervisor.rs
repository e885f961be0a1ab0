//! Drives the connection supervisor against a local listener standing in
//! for the reader.

use std::net::SocketAddr;
use std::time::Duration;

use gatelog_core::{
    Config, ConnectionEvent, ConnectionState, ConnectionSupervisor, EventBus, MemoryStore,
    NewVehicle, ReaderConfig, ScanEngine, ScanEvent, ScanStatus,
};
use socket2::{Domain, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const FRAME: [u8; 16] = [
    0xe2, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0x00, 0x11, 0x22, 0x33, 0x44,
];
const TAG: &str = "e20011223344556677889900";

fn reader_config(port: u16) -> ReaderConfig {
    ReaderConfig {
        host: "127.0.0.1".into(),
        port,
        connect_timeout_secs: 2,
        reconnect_delay_secs: 0,
        keepalive_interval_secs: 10,
        read_buffer_size: 1024,
    }
}

async fn next(rx: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("supervisor running")
}

#[tokio::test]
async fn test_reads_are_forwarded_then_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (tx, mut rx) = mpsc::channel(16);
    let (supervisor, state) = ConnectionSupervisor::new(reader_config(port), tx);
    let task = tokio::spawn(supervisor.run());

    assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting);
    let (mut socket, _) = listener.accept().await.unwrap();
    assert!(matches!(next(&mut rx).await, ConnectionEvent::Connected { .. }));
    assert_eq!(*state.borrow(), ConnectionState::Connected);

    assert_ok!(socket.write_all(&FRAME).await);
    match next(&mut rx).await {
        ConnectionEvent::Data(frame) => assert_eq!(frame.bytes(), &FRAME),
        other => panic!("expected data, got {other:?}"),
    }

    drop(socket);
    assert_eq!(next(&mut rx).await, ConnectionEvent::Closed);

    // Reconnects without a retry cap.
    assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting);
    let _second = listener.accept().await.unwrap();
    assert!(matches!(next(&mut rx).await, ConnectionEvent::Connected { .. }));

    drop(rx);
    task.abort();
}

#[tokio::test]
async fn test_refused_connection_is_reported_and_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (tx, mut rx) = mpsc::channel(16);
    let (supervisor, _state) = ConnectionSupervisor::new(reader_config(port), tx);
    let task = tokio::spawn(supervisor.run());

    for _ in 0..3 {
        assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting);
        match next(&mut rx).await {
            ConnectionEvent::ConnectFailed { error, timed_out } => {
                assert!(!timed_out);
                assert!(error.contains(&format!("127.0.0.1:{port}")));
            }
            other => panic!("expected connect failure, got {other:?}"),
        }
    }

    drop(rx);
    assert_ok!(timeout(Duration::from_secs(5), task).await);
}

/// A listener that never accepts, with its accept queue already full, so
/// further SYNs go unanswered.
async fn saturated_listener() -> (Socket, SocketAddr, Vec<TcpStream>) {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    socket.bind(&bind.into()).unwrap();
    socket.listen(0).unwrap();
    let addr = socket.local_addr().unwrap().as_socket().unwrap();

    let mut queued = Vec::new();
    for _ in 0..4 {
        if let Ok(Ok(stream)) =
            timeout(Duration::from_millis(200), TcpStream::connect(addr)).await
        {
            queued.push(stream);
        }
    }
    (socket, addr, queued)
}

#[tokio::test]
async fn test_connect_timeout_is_reported_and_retried() {
    let (_listener, addr, _queued) = saturated_listener().await;

    let mut config = reader_config(addr.port());
    config.connect_timeout_secs = 1;
    let (tx, mut rx) = mpsc::channel(16);
    let (supervisor, state) = ConnectionSupervisor::new(config, tx);
    let task = tokio::spawn(supervisor.run());

    assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting);
    match next(&mut rx).await {
        ConnectionEvent::ConnectFailed { error, timed_out } => {
            assert!(timed_out);
            assert!(error.contains("Timed out"));
        }
        other => panic!("expected connect timeout, got {other:?}"),
    }
    assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting);
    assert_eq!(*state.borrow(), ConnectionState::Connecting);

    drop(rx);
    task.abort();
}

#[tokio::test]
async fn test_end_to_end_scan_through_engine() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let store = MemoryStore::new();
    store
        .register_vehicle(NewVehicle {
            epc: TAG.into(),
            plate_no: Some("ABC 1234".into()),
            vehicle_name: None,
        })
        .await
        .unwrap();

    let bus = EventBus::new(64);
    let mut scans = bus.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let (engine, handle) = ScanEngine::new(store, bus, &Config::default());
    let (supervisor, _state) = ConnectionSupervisor::new(reader_config(port), tx);
    tokio::spawn(engine.run(rx));
    let supervisor_task = tokio::spawn(supervisor.run());

    let (mut socket, _) = listener.accept().await.unwrap();
    socket.write_all(&FRAME).await.unwrap();

    let status = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(ScanEvent::ScanResult { status, .. }) = scans.recv().await {
                return status;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(status, ScanStatus::Entering);

    let health = handle.health().await.unwrap();
    assert_eq!(health.successful_connections, 1);
    assert_eq!(handle.signal_stats().await.unwrap().total_reads, 1);

    supervisor_task.abort();
    assert_err!(supervisor_task.await);
}
