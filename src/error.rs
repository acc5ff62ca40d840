//! Error types for the proxy core.
//!
//! Mirrors the error kinds named in the design: configuration and bind
//! failures are fatal to a single Bridge, upstream failures are retried by
//! the Bridge's forwarding loop, and client-side framing failures end only
//! that client's session.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur while building a [`crate::config::AppConfig`] or a
/// [`crate::core::bridge::Bridge`] from it.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The unit-ID remapping table is not injective (two client IDs map to
    /// the same upstream ID), so the inverse used on replies would be
    /// ambiguous.
    #[error("unit-ID remapping is not injective: {0:#04x} and {1:#04x} both map to {2:#04x}")]
    NonInjectiveRemap(u8, u8, u8),

    /// A `modbus` URL did not parse as `tcp://host:port` or `rtu:///dev/...`.
    #[error("invalid modbus URL {0:?}: {1}")]
    InvalidModbusUrl(String, &'static str),

    /// A `listen.bind` address did not parse as `[host]:port`.
    #[error("invalid bind address {0:?}: {1}")]
    InvalidBindAddress(String, String),

    /// The configuration file's extension did not match a supported format.
    #[error("unsupported config file extension: {0:?}")]
    UnsupportedFormat(String),

    /// Reading the configuration file failed.
    #[error("reading config file {path:?}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Deserializing the configuration document failed.
    #[error("parsing config file {path:?}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying deserialization error.
        #[source]
        source: anyhow::Error,
    },

    /// Neither `--config-file` nor `--modbus` was given on the command line.
    #[error("must give a config-file or/and a --modbus URL")]
    NoDevices,

    /// A key in `unit_id_remapping` did not parse as a decimal `u8`.
    #[error("invalid unit ID {0:?} in unit_id_remapping: {1}")]
    InvalidUnitId(String, std::num::ParseIntError),
}

/// Errors surfaced by an [`crate::core::upstream::UpstreamLink`].
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// `connect` or `transact` did not complete within the configured
    /// per-operation timeout.
    #[error("upstream {0} timed out after {1:?}")]
    Timeout(SocketAddrOrPath, std::time::Duration),

    /// A read, write, or connect failed at the I/O layer (this also
    /// subsumes unexpected EOF).
    #[error("upstream {0} I/O error: {1}")]
    Io(SocketAddrOrPath, #[source] std::io::Error),

    /// The RTU serial device could not be opened because of filesystem
    /// permissions, even after a one-shot attempt to relax them.
    #[error("insufficient permissions on serial device {0}")]
    DevicePermission(String),

    /// The RTU serial device path does not exist or is not a character
    /// device.
    #[error("serial device {0} not available: {1}")]
    DeviceUnavailable(String, &'static str),

    /// A byte sequence on the RTU wire used a function code this proxy does
    /// not know how to frame.
    #[error("unsupported Modbus function code {0:#04x}")]
    UnsupportedFunction(u8),
}

/// Either a socket address or a serial device path, used purely for error
/// messages that should read naturally for either upstream kind.
#[derive(Debug, Clone)]
pub enum SocketAddrOrPath {
    /// A TCP upstream's address.
    Addr(SocketAddr),
    /// An RTU upstream's device path.
    Path(String),
}

impl std::fmt::Display for SocketAddrOrPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addr(addr) => write!(f, "{addr}"),
            Self::Path(path) => write!(f, "{path}"),
        }
    }
}

/// Errors surfaced while reading a single framed request from a client.
#[derive(Error, Debug)]
pub enum ClientFrameError {
    /// The client sent part of a frame and then closed or errored before
    /// the rest arrived.
    #[error("client closed mid-frame after {0} bytes")]
    ShortFrame(usize),

    /// A read or write on an otherwise idle client connection failed.
    #[error("client I/O error: {0}")]
    Io(#[source] std::io::Error),
}

/// Top-level error returned by [`crate::core::bridge::Bridge::start`].
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The listener could not bind to the configured address.
    #[error("failed to bind listener on {0}: {1}")]
    BindFailed(SocketAddr, #[source] std::io::Error),
}
