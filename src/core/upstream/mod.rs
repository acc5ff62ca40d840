//! The single upstream connection a Bridge maintains to its Modbus device:
//! lazy open, reconnect-on-failure, and one write-then-read transaction.

mod rtu;
mod tcp;

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_serial::SerialStream;
use tracing::{info, warn};

use crate::config::UpstreamTarget;
use crate::core::protocol::MbapFrame;
use crate::error::UpstreamError;

enum Connection {
    Tcp(TcpStream),
    Rtu(SerialStream),
}

/// Maintains at most one connection to the upstream device, reconnecting on
/// demand. Not `Clone`/`Sync`: a Bridge owns exactly one, guarded by its
/// `TransactionGate`.
pub struct UpstreamLink {
    target: UpstreamTarget,
    timeout: Duration,
    connection_time: Duration,
    connection: Option<Connection>,
}

impl UpstreamLink {
    pub fn new(target: UpstreamTarget, timeout: Duration, connection_time: Duration) -> Self {
        Self {
            target,
            timeout,
            connection_time,
            connection: None,
        }
    }

    fn description(&self) -> String {
        match &self.target {
            UpstreamTarget::Tcp(addr) => addr.to_string(),
            UpstreamTarget::Rtu { device, .. } => device.clone(),
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), UpstreamError> {
        if self.connection.is_some() {
            return Ok(());
        }

        self.connection = Some(match &self.target {
            UpstreamTarget::Tcp(addr) => {
                info!(upstream = %addr, "connecting to upstream");
                let stream = tcp::connect(*addr, self.timeout).await?;
                info!(upstream = %addr, "connected to upstream");
                Connection::Tcp(stream)
            }
            UpstreamTarget::Rtu { device, params } => {
                info!(upstream = %device, "connecting to RTU device");
                let port = rtu::connect(device, params, self.timeout).await?;
                info!(upstream = %device, "connected to RTU device");
                Connection::Rtu(port)
            }
        });

        if !self.connection_time.is_zero() {
            tokio::time::sleep(self.connection_time).await;
        }
        Ok(())
    }

    /// Ensure a connection, then perform one write-then-read transaction.
    /// `request` must already carry the upstream-side unit ID (the
    /// Remapper's forward output); the returned reply carries the same
    /// unit ID (the caller applies the inverse remap before replying to the
    /// client). Any failure drops the connection so the next call reopens.
    pub async fn transact(&mut self, request: &MbapFrame) -> Result<MbapFrame, UpstreamError> {
        self.ensure_connected().await?;

        let description = self.description();
        let result = match self.connection.as_mut().expect("just ensured connected") {
            Connection::Tcp(stream) => {
                let UpstreamTarget::Tcp(addr) = &self.target else {
                    unreachable!("connection kind tracks target kind")
                };
                tcp::transact(stream, *addr, request, self.timeout).await
            }
            Connection::Rtu(port) => {
                rtu::transact(port, &description, request, self.timeout).await
            }
        };

        if let Err(ref err) = result {
            warn!(upstream = %self.description(), error = %err, "upstream transaction failed, closing connection");
            self.connection = None;
        }
        result
    }

    /// Drop the current connection, if any. Idempotent.
    pub fn close(&mut self) {
        self.connection = None;
    }
}

impl std::fmt::Debug for UpstreamLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamLink")
            .field("target", &self.target)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
