//! Response bodies for `getInfo` and `addUser`.
//!
//! Everything except `activeUser` is fixed for the listener's lifetime, so the
//! `getInfo` object is assembled once and only the active user is filled in
//! per request.

use serde_json::{json, Map, Value};

use crate::identity::DeviceIdentity;
use crate::protocol_constants::{
    ACCOUNT_REQ, BRAND_DISPLAY_NAME, GROUP_STATUS, LIBRARY_VERSION, MODEL_DISPLAY_NAME,
    RESOLVER_VERSION, SCOPE, STATUS_OK, STATUS_STRING_OK, TOKEN_TYPE, VOICE_SUPPORT,
    ZEROCONF_VERSION,
};

/// Immutable `getInfo` body minus the active user.
#[derive(Debug, Clone)]
pub struct GetInfoTemplate {
    base: Map<String, Value>,
}

impl GetInfoTemplate {
    pub fn new(identity: &DeviceIdentity, public_key_base64: &str) -> Self {
        let base = json!({
            "status": STATUS_OK,
            "statusString": STATUS_STRING_OK,
            "spotifyError": 0,
            "version": ZEROCONF_VERSION,
            "libraryVersion": LIBRARY_VERSION,
            "accountReq": ACCOUNT_REQ,
            "brandDisplayName": BRAND_DISPLAY_NAME,
            "modelDisplayName": MODEL_DISPLAY_NAME,
            "voiceSupport": VOICE_SUPPORT,
            "availability": "",
            "productID": 0,
            "tokenType": TOKEN_TYPE,
            "groupStatus": GROUP_STATUS,
            "resolverVersion": RESOLVER_VERSION,
            "scope": SCOPE,
            "deviceID": identity.id,
            "remoteName": identity.name,
            "publicKey": public_key_base64,
            "deviceType": identity.device_type.as_wire_str(),
        });

        let base = match base {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { base }
    }

    /// Renders the body with the given active user (empty if none).
    pub fn render(&self, active_user: &str) -> String {
        let mut body = self.base.clone();
        body.insert("activeUser".to_string(), Value::from(active_user));
        Value::Object(body).to_string()
    }
}

/// Fixed `addUser` success body.
pub fn add_user_success_body() -> String {
    json!({
        "status": STATUS_OK,
        "spotifyError": 0,
        "statusString": STATUS_STRING_OK,
    })
    .to_string()
}
