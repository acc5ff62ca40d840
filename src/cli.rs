//! Command-line argument surface.
//!
//! A config file and/or a `--modbus` URL, with `--bind`,
//! `--modbus-connection-time`, and `--timeout` only meaningful alongside
//! `--modbus`. Parsing never fails on a missing device; that check happens
//! once, after merging with any config file, so the error message can name
//! both sources.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, DeviceConfig, ListenConfig, ModbusConfig};
use crate::error::ConfigError;

/// Modbus proxy: a reverse proxy that serializes client access to a
/// single upstream Modbus TCP or RTU device.
#[derive(Parser, Debug)]
#[command(name = "modbus-proxy", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML, or JSON).
    #[arg(short = 'c', long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Listen address for the `--modbus` device, e.g. `:502` or `0.0.0.0:502`.
    #[arg(short, long, default_value = ":502")]
    pub bind: String,

    /// Modbus device address, e.g. `tcp://plc.acme.org:502` or `rtu:///dev/ttyUSB0`.
    #[arg(long)]
    pub modbus: Option<String>,

    /// Delay in seconds after establishing the upstream connection, before
    /// the first request.
    #[arg(long = "modbus-connection-time", default_value_t = 0.0)]
    pub modbus_connection_time: f64,

    /// Connect/write/read timeout in seconds.
    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,
}

impl Cli {
    /// Build the effective [`AppConfig`] by loading `--config-file` (if
    /// given) and appending one more device for `--modbus` (if given).
    /// Fails with [`ConfigError::NoDevices`] if neither was supplied.
    pub fn into_config(self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config_file {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(url) = self.modbus {
            config.devices.push(DeviceConfig {
                modbus: ModbusConfig {
                    url,
                    timeout: self.timeout,
                    connection_time: self.modbus_connection_time,
                    serial: Default::default(),
                },
                listen: ListenConfig { bind: self.bind },
                unit_id_remapping: Default::default(),
            });
        }

        if config.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        Ok(config)
    }
}
