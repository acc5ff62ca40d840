//! Configuration document and CLI-flag merging.
//!
//! A deployment describes one or more devices, each a `(listen address,
//! upstream address)` pair plus optional serial parameters and unit-ID
//! remapping. The document is TOML, YAML, or JSON, selected by the config
//! file's extension and deserializes with `serde`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Parity setting for an RTU serial upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SerialParity {
    /// No parity bit.
    #[default]
    N,
    /// Even parity.
    E,
    /// Odd parity.
    O,
}

/// Serial line parameters for an RTU upstream, applied on every open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParams {
    /// Baud rate, e.g. 9600 or 115200.
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Data bits, typically 7 or 8.
    #[serde(default = "default_databits")]
    pub databits: u8,
    /// Parity.
    #[serde(default)]
    pub parity: SerialParity,
    /// Stop bits, 1 or 2.
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
}

fn default_baudrate() -> u32 {
    9600
}
fn default_databits() -> u8 {
    8
}
fn default_stopbits() -> u8 {
    1
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baudrate: default_baudrate(),
            databits: default_databits(),
            parity: SerialParity::default(),
            stopbits: default_stopbits(),
        }
    }
}

/// A resolved upstream target: either a TCP socket or an RTU serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamTarget {
    /// Modbus/TCP device reachable over the network.
    Tcp(SocketAddr),
    /// Modbus/RTU device attached as a serial port.
    Rtu {
        /// Device path, e.g. `/dev/ttyUSB0`.
        device: String,
        /// Serial line parameters.
        params: SerialParams,
    },
}

/// The `modbus` section of a device entry: upstream address, timeouts, and
/// (for RTU) serial parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// `tcp://host:port` or `rtu:///dev/ttyX`.
    pub url: String,
    /// Per-operation timeout in seconds, applied independently to connect,
    /// write, and read.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Delay in seconds after a successful upstream open, before the first
    /// transaction on that connection.
    #[serde(default)]
    pub connection_time: f64,
    /// Serial parameters, used only when `url` is `rtu://`.
    #[serde(flatten, default)]
    pub serial: SerialParams,
}

fn default_timeout() -> f64 {
    10.0
}

/// The `listen` section of a device entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// `[host]:port` to bind the client-facing TCP listener on.
    pub bind: String,
}

/// One device entry: an upstream, a listen address, and an optional
/// unit-ID remapping.
///
/// `unit_id_remapping` is kept as string keys at the serde layer because
/// not every supported document format (JSON in particular) allows
/// non-string map keys; [`DeviceConfig::unit_id_remapping_u8`] parses them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Upstream device address and timeouts.
    pub modbus: ModbusConfig,
    /// Client-facing listen address.
    pub listen: ListenConfig,
    /// Partial mapping from client-side unit-ID to upstream-side unit-ID.
    /// Must be injective on its declared domain.
    #[serde(default)]
    pub unit_id_remapping: HashMap<String, u8>,
}

impl DeviceConfig {
    /// Parse `unit_id_remapping`'s string keys into `u8`s.
    pub fn unit_id_remapping_u8(&self) -> Result<HashMap<u8, u8>, ConfigError> {
        self.unit_id_remapping
            .iter()
            .map(|(k, v)| {
                k.parse::<u8>()
                    .map(|k| (k, *v))
                    .map_err(|e| ConfigError::InvalidUnitId(k.clone(), e))
            })
            .collect()
    }
}

/// The full configuration document: a list of devices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Devices to bridge, each independent of the others.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl AppConfig {
    /// Load a configuration document from `path`, dispatching on its file
    /// extension (`.toml`, `.yml`/`.yaml`, or `.json`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let parsed = match ext.as_str() {
            "toml" => toml::from_str(&content).map_err(anyhow::Error::from),
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(anyhow::Error::from),
            "json" => serde_json::from_str(&content).map_err(anyhow::Error::from),
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        parsed.map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Parse a `tcp://host:port` or `rtu:///dev/ttyX` URL into an
/// [`UpstreamTarget`]. A bare `host:port` with no scheme is treated as
/// `tcp://host:port`.
pub fn parse_modbus_url(url: &str, serial: &SerialParams) -> Result<UpstreamTarget, ConfigError> {
    let with_scheme = if url.contains("://") {
        url.to_string()
    } else {
        format!("tcp://{url}")
    };

    if let Some(rest) = with_scheme.strip_prefix("rtu://") {
        let device = rest.trim_start_matches('/');
        if device.is_empty() {
            return Err(ConfigError::InvalidModbusUrl(
                url.to_string(),
                "rtu:// URL has no device path",
            ));
        }
        return Ok(UpstreamTarget::Rtu {
            device: format!("/{device}"),
            params: serial.clone(),
        });
    }

    if let Some(rest) = with_scheme.strip_prefix("tcp://") {
        let addr = parse_host_port(rest, None)
            .ok_or(ConfigError::InvalidModbusUrl(url.to_string(), "expected host:port"))?;
        return Ok(UpstreamTarget::Tcp(addr));
    }

    Err(ConfigError::InvalidModbusUrl(
        url.to_string(),
        "unsupported scheme, expected tcp:// or rtu://",
    ))
}

/// Parse a `[host]:port` bind address, defaulting the host to `0.0.0.0` and
/// the port to 502 when omitted.
pub fn parse_bind_address(bind: &str) -> Result<SocketAddr, ConfigError> {
    parse_host_port(bind, Some(502))
        .ok_or_else(|| ConfigError::InvalidBindAddress(bind.to_string(), "expected [host]:port".into()))
}

fn parse_host_port(s: &str, default_port: Option<u16>) -> Option<SocketAddr> {
    let s = s.trim_start_matches('/');
    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok()?),
        None => (s, default_port?),
    };
    let host = if host.is_empty() { None } else { Some(host) };
    let ip = match host {
        None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        Some(h) => h.parse::<IpAddr>().ok().or_else(|| {
            // Accept a bare hostname the same way `ToSocketAddrs` would;
            // for the common numeric-address case this never touches the
            // network.
            std::net::ToSocketAddrs::to_socket_addrs(&(h, 0))
                .ok()
                .and_then(|mut it| it.next())
                .map(|a| a.ip())
        })?,
    };
    Some(SocketAddr::new(ip, port))
}

/// The per-operation timeout as a [`Duration`], shared by connect, write,
/// and read.
pub fn timeout_duration(cfg: &ModbusConfig) -> Duration {
    Duration::from_secs_f64(cfg.timeout.max(0.0))
}

/// The post-connect settle delay as a [`Duration`].
pub fn connection_time_duration(cfg: &ModbusConfig) -> Duration {
    Duration::from_secs_f64(cfg.connection_time.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_url() {
        let target = parse_modbus_url("tcp://plc.acme.org:502", &SerialParams::default()).unwrap();
        assert!(matches!(target, UpstreamTarget::Tcp(_)));
    }

    #[test]
    fn parses_bare_host_port_as_tcp() {
        let target = parse_modbus_url("127.0.0.1:1502", &SerialParams::default()).unwrap();
        match target {
            UpstreamTarget::Tcp(addr) => assert_eq!(addr.port(), 1502),
            _ => panic!("expected tcp target"),
        }
    }

    #[test]
    fn parses_rtu_url() {
        let target = parse_modbus_url("rtu:///dev/ttyUSB0", &SerialParams::default()).unwrap();
        match target {
            UpstreamTarget::Rtu { device, .. } => assert_eq!(device, "/dev/ttyUSB0"),
            _ => panic!("expected rtu target"),
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = parse_modbus_url("ssh://host", &SerialParams::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModbusUrl(_, _)));
    }

    #[test]
    fn parses_bind_with_missing_host() {
        let addr = parse_bind_address(":502").unwrap();
        assert_eq!(addr.port(), 502);
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn parses_bind_with_explicit_host() {
        let addr = parse_bind_address("127.0.0.1:1502").unwrap();
        assert_eq!(addr.port(), 1502);
    }

    #[test]
    fn toml_round_trip() {
        let doc = r#"
            [[devices]]
            modbus = { url = "tcp://plc:502", timeout = 5.0 }
            listen = { bind = ":1502" }
            unit_id_remapping = { "17" = 34 }
        "#;
        let cfg: AppConfig = toml::from_str(doc).unwrap();
        assert_eq!(cfg.devices.len(), 1);
        let remap = cfg.devices[0].unit_id_remapping_u8().unwrap();
        assert_eq!(remap.get(&17), Some(&34));
    }

    #[test]
    fn loads_a_yaml_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.yaml");
        std::fs::write(
            &path,
            "devices:\n  - modbus:\n      url: tcp://plc:502\n    listen:\n      bind: \":1502\"\n",
        )
        .unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.devices[0].modbus.url, "tcp://plc:502");
    }

    #[test]
    fn rejects_an_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.ini");
        std::fs::write(&path, "").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "ini"));
    }
}
