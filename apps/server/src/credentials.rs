//! Credential hand-off to the external player process.
//!
//! The server does not log in to the account itself. It writes the decrypted
//! credential to `credentials.json` in the data directory, where the player
//! picks it up. Closing the session removes the file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use snapspot_core::{now_millis, AccountAuthenticator, AuthenticationError, Session, SessionParams};

pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile<'a> {
    username: &'a str,
    /// Base64 of the decrypted blob.
    auth_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_name: Option<&'a str>,
    created_at: u64,
}

/// Authenticator that persists credentials for another process.
pub struct CredentialHandoffAuthenticator {
    dir: PathBuf,
}

impl CredentialHandoffAuthenticator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE_NAME)
    }
}

#[async_trait]
impl AccountAuthenticator for CredentialHandoffAuthenticator {
    async fn authenticate(
        &self,
        params: SessionParams,
    ) -> Result<Box<dyn Session>, AuthenticationError> {
        let file = CredentialsFile {
            username: &params.username,
            auth_data: BASE64.encode(&params.blob),
            device_name: params.device_name.as_deref(),
            created_at: now_millis(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| AuthenticationError::new(format!("Failed to encode credentials: {}", e)))?;

        let path = self.path();
        write_atomically(&self.dir, &path, &json)
            .await
            .map_err(|e| {
                AuthenticationError::new(format!("Failed to write {}: {}", path.display(), e))
            })?;

        log::info!("Credentials for {} written to {}", params.username, path.display());
        Ok(Box::new(HandoffSession {
            username: params.username,
            path,
        }))
    }
}

async fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

struct HandoffSession {
    username: String,
    path: PathBuf,
}

#[async_trait]
impl Session for HandoffSession {
    fn username(&self) -> &str {
        &self.username
    }

    async fn close(&mut self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => log::info!("Removed credentials for {}", self.username),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}
