//! The per-device Bridge: a Listener plus a TransactionGate serializing
//! access to one UpstreamLink across every accepted ClientSession.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{self, DeviceConfig};
use crate::core::protocol::MbapFrame;
use crate::core::remap::Remapper;
use crate::core::session;
use crate::core::upstream::UpstreamLink;
use crate::error::{BridgeError, ConfigError, UpstreamError};

/// Serializes every upstream transaction for one Bridge behind a single
/// async mutex, held across the full write+read (not just the write) so
/// that replies can never be captured by the wrong waiter. `tokio::sync::
/// Mutex` is used rather than `parking_lot`'s because the lock is held
/// across `.await` points.
pub struct TransactionGate {
    link: Mutex<UpstreamLink>,
}

impl TransactionGate {
    pub fn new(link: UpstreamLink) -> Self {
        Self { link: Mutex::new(link) }
    }

    /// Run one logical client request to completion: up to `attempts`
    /// write-then-read attempts against the upstream, all under the same
    /// lock acquisition so the whole sequence is atomic with respect to
    /// other callers.
    pub async fn write_read(&self, request: &MbapFrame, attempts: u32) -> Result<MbapFrame, UpstreamError> {
        let mut link = self.link.lock().await;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match link.transact(request).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    warn!(attempt, error = %err, "upstream attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("attempts is always >= 1"))
    }

    pub async fn close(&self) {
        self.link.lock().await.close();
    }
}

/// One (listen address ↔ upstream) pair, not yet bound.
pub struct Bridge {
    listen_addr: SocketAddr,
    gate: Arc<TransactionGate>,
    remapper: Arc<Remapper>,
}

impl Bridge {
    /// Build a Bridge from one device's configuration. Fails with
    /// [`ConfigError`] before any socket is touched: a bad URL, a bad bind
    /// address, or a non-injective unit-ID remap are all refused here.
    pub fn new(device: &DeviceConfig) -> Result<Self, ConfigError> {
        let listen_addr = config::parse_bind_address(&device.listen.bind)?;
        let target = config::parse_modbus_url(&device.modbus.url, &device.modbus.serial)?;
        let remapper = Remapper::new(device.unit_id_remapping_u8()?)?;

        let link = UpstreamLink::new(
            target,
            config::timeout_duration(&device.modbus),
            config::connection_time_duration(&device.modbus),
        );

        Ok(Self {
            listen_addr,
            gate: Arc::new(TransactionGate::new(link)),
            remapper: Arc::new(remapper),
        })
    }

    /// Bind the listener and start accepting clients in a background task.
    pub async fn start(self) -> Result<BridgeHandle, BridgeError> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| BridgeError::BindFailed(self.listen_addr, e))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::BindFailed(self.listen_addr, e))?;

        info!(bind = %listen_addr, "bridge listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let gate = self.gate.clone();
        let remapper = self.remapper.clone();

        let span = info_span!("bridge", bind = %listen_addr);
        let join = tokio::spawn(serve(listener, gate.clone(), remapper, shutdown_rx).instrument(span));

        Ok(BridgeHandle {
            listen_addr,
            join,
            shutdown_tx,
            gate,
        })
    }
}

/// A started Bridge: a background accept loop plus the means to stop it.
pub struct BridgeHandle {
    listen_addr: SocketAddr,
    join: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    gate: Arc<TransactionGate>,
}

impl BridgeHandle {
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Stop accepting new clients, let in-flight sessions drain (each sees
    /// its read cancelled, ending the session), then close the upstream.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
        self.gate.close().await;
    }
}

async fn serve(
    listener: TcpListener,
    gate: Arc<TransactionGate>,
    remapper: Arc<Remapper>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "client connected");
                        sessions.spawn(session::run(stream, peer, gate.clone(), remapper.clone(), shutdown.clone()));
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                }
            }
        }
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}
}
