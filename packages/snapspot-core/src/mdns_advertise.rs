//! mDNS advertisement of the zeroconf endpoint.
//!
//! Connect clients browse `_spotify-connect._tcp` and then talk to the
//! advertised host/port with the TXT `CPath`. Advertisement is best-effort:
//! failures are reported to the caller, which decides whether to continue.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use mdns_sd::{ServiceDaemon, ServiceInfo};

use crate::identity::DeviceIdentity;
use crate::protocol_constants::{MDNS_CPATH, MDNS_SERVICE_TYPE, MDNS_TXT_VERSION};

/// Registers the Connect service with the local mDNS responder.
///
/// The service is unregistered when dropped.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    service_fullname: String,
    shutdown_called: AtomicBool,
}

impl MdnsAdvertiser {
    /// Creates and registers the advertisement.
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be created or the service
    /// cannot be registered.
    pub fn new(
        identity: &DeviceIdentity,
        advertise_ip: IpAddr,
        port: u16,
    ) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "snapspot".to_string());
        let dns_hostname = sanitize_hostname(&hostname);

        let txt = txt_records();
        let service = ServiceInfo::new(
            MDNS_SERVICE_TYPE,
            &identity.name,
            &format!("{}.local.", dns_hostname),
            advertise_ip,
            port,
            Some(txt),
        )?;

        let fullname = service.get_fullname().to_string();
        daemon.register(service)?;

        log::info!(
            "[mDNS] Advertising '{}' at {}:{}",
            identity.name,
            advertise_ip,
            port
        );

        Ok(Self {
            daemon,
            service_fullname: fullname,
            shutdown_called: AtomicBool::new(false),
        })
    }

    /// Unregisters the service. Subsequent calls are no-ops.
    pub fn shutdown(&self) {
        if self.shutdown_called.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.daemon.unregister(&self.service_fullname) {
            log::warn!("[mDNS] Failed to unregister service: {}", e);
        }
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn txt_records() -> HashMap<String, String> {
    let mut txt = HashMap::new();
    txt.insert("CPath".to_string(), MDNS_CPATH.to_string());
    txt.insert("VERSION".to_string(), MDNS_TXT_VERSION.to_string());
    txt.insert("Stack".to_string(), "SP".to_string());
    txt
}

/// Lowercases and strips everything but ASCII alphanumerics and `-`.
fn sanitize_hostname(hostname: &str) -> String {
    hostname
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}
