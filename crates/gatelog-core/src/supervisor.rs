//! Reader connection lifecycle.
//!
//! The supervisor owns the TCP socket and cycles through
//! `Disconnected → Connecting → Connected → Closing | Failed → Disconnected`
//! forever, sleeping a fixed delay between attempts. It never touches engine
//! state: every outcome and every read is sent as a [`ConnectionEvent`] into
//! the engine's bounded channel, in order. A full channel makes the
//! supervisor wait, which in turn stops it reading from the socket.
//!
//! The supervisor stops when the engine drops its receiver.

use std::time::{Duration, Instant};

use chrono::Utc;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::config::{ReachabilityConfig, ReaderConfig};
use crate::error::GatelogError;
use crate::types::{ConnectionState, RawFrame, ReachabilityResult};

/// Messages from the connection tasks to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connect attempt started.
    Connecting,
    /// The socket is up.
    Connected {
        /// Time from attempt start to established connection.
        latency: Duration,
    },
    /// The connect attempt failed or timed out.
    ConnectFailed {
        /// Failure description.
        error: String,
        /// Whether the connect timeout fired.
        timed_out: bool,
    },
    /// One socket read.
    Data(RawFrame),
    /// The reader closed the stream.
    Closed,
    /// The established connection failed.
    Error(String),
    /// A reachability probe finished.
    Reachability(ReachabilityResult),
}

type SendResult = Result<(), mpsc::error::SendError<ConnectionEvent>>;

/// Owns the reader socket and reconnects forever.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    config: ReaderConfig,
    events: mpsc::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    /// Supervisor reporting into `events`. The returned receiver tracks the
    /// connection state.
    #[must_use]
    pub fn new(
        config: ReaderConfig,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                config,
                events,
                state,
            },
            state_rx,
        )
    }

    /// Another receiver for the connection state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, read, reconnect. Returns only once the engine is gone.
    pub async fn run(self) {
        let address = self.config.address();
        tracing::info!(address = %address, "Starting reader connection supervisor");

        loop {
            if self.attempt(&address).await.is_err() {
                break;
            }
            self.set_state(ConnectionState::Disconnected);
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Engine stopped; connection supervisor exiting");
    }

    async fn attempt(&self, address: &str) -> SendResult {
        self.set_state(ConnectionState::Connecting);
        self.events.send(ConnectionEvent::Connecting).await?;
        tracing::debug!(address = %address, "Connecting to reader");

        let started = Instant::now();
        let stream =
            match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(address))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    let error = GatelogError::ConnectFailed {
                        address: address.to_string(),
                        message: e.to_string(),
                    };
                    return self.connect_failed(&error, false).await;
                }
                Err(_) => {
                    let error = GatelogError::ConnectTimeout {
                        address: address.to_string(),
                        timeout_secs: self.config.connect_timeout_secs,
                    };
                    return self.connect_failed(&error, true).await;
                }
            };
        let latency = started.elapsed();

        if let Err(e) = enable_keepalive(&stream, self.config.keepalive_interval()) {
            tracing::warn!(error = %e, "Failed to enable TCP keep-alive");
        }

        self.set_state(ConnectionState::Connected);
        tracing::info!(
            address = %address,
            latency_ms = latency.as_millis(),
            "Connected to reader"
        );
        self.events
            .send(ConnectionEvent::Connected { latency })
            .await?;

        self.read_until_closed(stream).await
    }

    async fn connect_failed(&self, error: &GatelogError, timed_out: bool) -> SendResult {
        self.set_state(ConnectionState::Failed);
        tracing::warn!(error = %error, "Reader connection attempt failed");
        self.events
            .send(ConnectionEvent::ConnectFailed {
                error: error.to_string(),
                timed_out,
            })
            .await
    }

    /// Forward reads until EOF or error. The stream is dropped on return.
    async fn read_until_closed(&self, mut stream: TcpStream) -> SendResult {
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    self.set_state(ConnectionState::Closing);
                    tracing::warn!("Reader closed the connection");
                    return self.events.send(ConnectionEvent::Closed).await;
                }
                Ok(n) => {
                    let frame = RawFrame::now(buf[..n].to_vec());
                    tracing::trace!(len = n, "Frame received");
                    self.events.send(ConnectionEvent::Data(frame)).await?;
                }
                Err(e) => {
                    self.set_state(ConnectionState::Failed);
                    tracing::error!(error = %e, "Reader connection error");
                    return self.events.send(ConnectionEvent::Error(e.to_string())).await;
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

fn enable_keepalive(stream: &TcpStream, interval: Duration) -> std::io::Result<()> {
    let keepalive = TcpKeepalive::new()
        .with_time(interval)
        .with_interval(interval);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Open and immediately drop a TCP connection to `host:port`.
pub async fn probe_reachability(host: &str, port: u16, timeout: Duration) -> ReachabilityResult {
    let address = format!("{host}:{port}");
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, TcpStream::connect(&address)).await;
    let (reachable, latency_ms, error) = match outcome {
        Ok(Ok(_stream)) => (
            true,
            Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
            None,
        ),
        Ok(Err(e)) => (false, None, Some(e.to_string())),
        Err(_) => (
            false,
            None,
            Some(format!("timed out after {} ms", timeout.as_millis())),
        ),
    };

    ReachabilityResult {
        address,
        reachable,
        latency_ms,
        error,
        checked_at: Utc::now(),
    }
}

/// Probe the reader every `config.interval()` and report each result.
/// Returns immediately when probing is disabled, otherwise once the engine
/// is gone.
pub async fn run_reachability_probe(
    config: ReachabilityConfig,
    reader: ReaderConfig,
    events: mpsc::Sender<ConnectionEvent>,
) {
    if !config.enabled {
        tracing::debug!("Reachability probe disabled");
        return;
    }

    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let result = probe_reachability(&reader.host, reader.port, config.timeout()).await;
        if !result.reachable {
            tracing::warn!(
                address = %result.address,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Reader unreachable"
            );
        }
        if events
            .send(ConnectionEvent::Reachability(result))
            .await
            .is_err()
        {
            break;
        }
    }
}
