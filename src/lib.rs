//! # modbus-proxy core
//!
//! A reverse proxy that serializes many TCP clients' access to a single
//! Modbus device (TCP or RTU/serial), hides transient upstream
//! disconnections, and optionally rewrites the Modbus unit identifier.
//!
//! The crate exposes [`config::AppConfig`] for describing one or more
//! devices, [`cli::Cli`] for the command-line surface, and the per-device
//! forwarder [`core::bridge::Bridge`] as its public API. The binary at
//! `src/main.rs` wires these together; this library is usable standalone
//! by anything that wants to embed a Bridge.
//!
//! ## Example
//!
//! ```rust,no_run
//! use modbus_proxy_core::config::DeviceConfig;
//! use modbus_proxy_core::core::bridge::Bridge;
//!
//! # async fn run(device: DeviceConfig) -> anyhow::Result<()> {
//! let bridge = Bridge::new(&device)?;
//! let handle = bridge.start().await?;
//! tokio::signal::ctrl_c().await?;
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;

pub use crate::cli::Cli;
pub use crate::config::{AppConfig, DeviceConfig};
pub use crate::core::bridge::{Bridge, BridgeHandle};
pub use crate::error::{BridgeError, ClientFrameError, ConfigError, UpstreamError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
