//! Network configuration context.
//!
//! [`NetworkContext`] carries the bound listener port and the IP address the
//! service is advertised on. It supports explicit configuration (server
//! deployment) and auto-detection.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;

/// Network configuration shared across services.
#[derive(Clone)]
pub struct NetworkContext {
    /// Listener port (0 until the listener binds).
    port: Arc<RwLock<u16>>,
    /// IP address clients can reach us at.
    local_ip: IpAddr,
}

impl NetworkContext {
    /// Creates a context with an explicitly configured advertise IP.
    #[must_use]
    pub fn explicit(port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(port)),
            local_ip: advertise_ip,
        }
    }

    /// Creates a context by detecting the local IP.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial IP detection fails.
    pub fn auto_detect(port: u16, ip_detector: Arc<dyn IpDetector>) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            port: Arc::new(RwLock::new(port)),
            local_ip,
        })
    }

    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    #[must_use]
    pub fn get_local_ip(&self) -> IpAddr {
        self.local_ip
    }
}

/// Trait for detecting the local IP address.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<IpAddr, NetworkError>;
}

/// Detector backed by the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<IpAddr, NetworkError> {
        local_ip_address::local_ip().map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),
}
