//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use snapspot_core::DeviceType;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the zeroconf listener to.
    /// Override: `SNAPSPOT_BIND_ADDRESS`
    pub bind_address: IpAddr,

    /// Port to bind the zeroconf listener to (0 = ephemeral).
    /// Override: `SNAPSPOT_BIND_PORT`
    pub bind_port: u16,

    /// IP address advertised over mDNS.
    /// If not specified, auto-detection will be attempted.
    /// Override: `SNAPSPOT_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Name shown in Connect clients.
    /// Override: `SNAPSPOT_DEVICE_NAME`
    pub device_name: String,

    /// Override: `SNAPSPOT_DEVICE_TYPE`
    pub device_type: DeviceType,

    pub locale: String,

    /// Seconds to wait for a complete request (0 = no limit).
    /// Override: `SNAPSPOT_READ_TIMEOUT`
    pub read_timeout_secs: u64,

    /// Advertise the endpoint over mDNS.
    pub mdns: bool,

    /// Directory for the device id and handed-off credentials.
    /// Override: `SNAPSPOT_DATA_DIR` (via clap)
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 0,
            advertise_ip: None,
            device_name: "Snapspot".to_string(),
            device_type: DeviceType::Speaker,
            locale: "en".to_string(),
            read_timeout_secs: 10,
            mdns: true,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides from `lookup`; unparsable values are ignored.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("SNAPSPOT_BIND_ADDRESS").and_then(|v| v.parse().ok()) {
            self.bind_address = addr;
        }

        if let Some(port) = lookup("SNAPSPOT_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(ip) = lookup("SNAPSPOT_ADVERTISE_IP").and_then(|v| v.parse().ok()) {
            self.advertise_ip = Some(ip);
        }

        if let Some(name) = lookup("SNAPSPOT_DEVICE_NAME").filter(|v| !v.trim().is_empty()) {
            self.device_name = name;
        }

        if let Some(val) = lookup("SNAPSPOT_DEVICE_TYPE") {
            match val.parse() {
                Ok(device_type) => self.device_type = device_type,
                Err(e) => log::warn!("Ignoring SNAPSPOT_DEVICE_TYPE: {}", e),
            }
        }

        if let Some(secs) = lookup("SNAPSPOT_READ_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.read_timeout_secs = secs;
        }

        // Note: SNAPSPOT_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to snapspot-core's Config type.
    pub fn to_core_config(&self) -> snapspot_core::Config {
        snapspot_core::Config {
            bind_address: self.bind_address,
            preferred_port: self.bind_port,
            read_timeout_secs: self.read_timeout_secs,
            device_name: self.device_name.clone(),
            device_type: self.device_type,
            locale: self.locale.clone(),
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }
}
