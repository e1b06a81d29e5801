//! Core configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::DeviceType;
use crate::protocol_constants::{EVENT_CHANNEL_CAPACITY, MIN_LISTEN_PORT};

/// Configuration for the zeroconf endpoint.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Address the zeroconf listener binds to.
    pub bind_address: IpAddr,

    /// Port for the zeroconf listener (0 = ephemeral).
    pub preferred_port: u16,

    /// Seconds to wait for a complete request before dropping the
    /// connection (0 = wait forever).
    pub read_timeout_secs: u64,

    // Identity
    /// Name shown in Connect clients.
    pub device_name: String,

    /// Device kind shown in Connect clients.
    pub device_type: DeviceType,

    /// Locale reported to clients.
    pub locale: String,

    /// Directory for the persisted device id. Without one the id changes
    /// on every start.
    pub data_dir: Option<PathBuf>,

    // Events
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            preferred_port: 0,
            read_timeout_secs: 10,
            device_name: "Snapspot".to_string(),
            device_type: DeviceType::Speaker,
            locale: "en".to_string(),
            data_dir: None,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.preferred_port != 0 && self.preferred_port < MIN_LISTEN_PORT {
            return Err(format!(
                "preferred_port must be 0 or >= {} (got {})",
                MIN_LISTEN_PORT, self.preferred_port
            ));
        }
        if self.device_name.trim().is_empty() {
            return Err("device_name must not be empty".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }

    /// Request read timeout, if enabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}
