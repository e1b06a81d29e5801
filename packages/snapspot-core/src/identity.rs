//! Device identity advertised to Connect clients.
//!
//! The identity is fixed for the lifetime of the process. The device id is
//! generated once and persisted in the data directory so that clients keep
//! recognizing the same device across restarts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::{DEVICE_FILE_NAME, DEVICE_ID_BYTES};

/// Kind of device reported in `getInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Computer,
    Tablet,
    Smartphone,
    #[default]
    Speaker,
    Tv,
    Avr,
    Stb,
    AudioDongle,
}

impl DeviceType {
    /// Upper-cased wire name (`SPEAKER`, `AUDIO_DONGLE`, ...).
    #[must_use]
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::Computer => "COMPUTER",
            Self::Tablet => "TABLET",
            Self::Smartphone => "SMARTPHONE",
            Self::Speaker => "SPEAKER",
            Self::Tv => "TV",
            Self::Avr => "AVR",
            Self::Stb => "STB",
            Self::AudioDongle => "AUDIO_DONGLE",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl FromStr for DeviceType {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "computer" => Ok(Self::Computer),
            "tablet" => Ok(Self::Tablet),
            "smartphone" => Ok(Self::Smartphone),
            "speaker" => Ok(Self::Speaker),
            "tv" => Ok(Self::Tv),
            "avr" => Ok(Self::Avr),
            "stb" => Ok(Self::Stb),
            "audio_dongle" => Ok(Self::AudioDongle),
            _ => Err(IdentityError::UnknownDeviceType(s.to_string())),
        }
    }
}

/// Errors from loading or persisting the device identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("Failed to persist device identity to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable per-process device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_type: DeviceType,
    pub name: String,
    pub id: String,
    pub locale: String,
}

/// On-disk form of the persisted identity.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedDevice {
    device_id: String,
}

impl DeviceIdentity {
    /// Creates an identity with a freshly generated, non-persisted id.
    pub fn ephemeral(
        device_type: DeviceType,
        name: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            device_type,
            name: name.into(),
            id: generate_device_id(),
            locale: locale.into(),
        }
    }

    /// Loads the persisted device id from `data_dir`, generating and saving
    /// one if absent.
    ///
    /// An unreadable or corrupt file is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Persist`] if a newly generated id cannot be
    /// written.
    pub fn load_or_create(
        data_dir: &Path,
        device_type: DeviceType,
        name: impl Into<String>,
        locale: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let path = data_dir.join(DEVICE_FILE_NAME);

        let id = match read_device_id(&path) {
            Some(id) => {
                log::debug!("[Identity] Loaded device id from {}", path.display());
                id
            }
            None => {
                let id = generate_device_id();
                write_device_id(data_dir, &path, &id)?;
                log::info!("[Identity] Generated new device id at {}", path.display());
                id
            }
        };

        Ok(Self {
            device_type,
            name: name.into(),
            id,
            locale: locale.into(),
        })
    }
}

fn read_device_id(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<PersistedDevice>(&content) {
        Ok(device) if is_valid_device_id(&device.device_id) => Some(device.device_id),
        Ok(_) => {
            log::warn!("[Identity] Ignoring malformed device id in {}", path.display());
            None
        }
        Err(e) => {
            log::warn!("[Identity] Ignoring unreadable {}: {}", path.display(), e);
            None
        }
    }
}

fn write_device_id(data_dir: &Path, path: &Path, id: &str) -> Result<(), IdentityError> {
    let persist_err = |source| IdentityError::Persist {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(data_dir).map_err(persist_err)?;
    let body = serde_json::to_string_pretty(&PersistedDevice {
        device_id: id.to_string(),
    })
    .map_err(|e| persist_err(std::io::Error::other(e)))?;
    std::fs::write(path, body).map_err(persist_err)
}

fn generate_device_id() -> String {
    let mut bytes = [0u8; DEVICE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_valid_device_id(id: &str) -> bool {
    id.len() == DEVICE_ID_BYTES * 2 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
