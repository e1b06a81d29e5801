//! Fixed protocol constants that should NOT be changed.
//!
//! These values are dictated by the Spotify Connect zeroconf protocol and the
//! clients that speak it. Changing them breaks discovery or the handshake.

// ─────────────────────────────────────────────────────────────────────────────
// Zeroconf Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Form content type required on `addUser` POST requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request parameter carrying the dispatched action name.
pub const ACTION_PARAM: &str = "action";

/// Action name for the device info query.
pub const ACTION_GET_INFO: &str = "getInfo";

/// Action name for credential submission.
pub const ACTION_ADD_USER: &str = "addUser";

/// Status code reported inside every successful JSON body.
///
/// Not an HTTP status; clients check `status == 101` for success.
pub const STATUS_OK: u32 = 101;

/// Status string paired with [`STATUS_OK`].
pub const STATUS_STRING_OK: &str = "OK";

/// Zeroconf protocol version advertised in `getInfo`.
pub const ZEROCONF_VERSION: &str = "2.7.1";

/// Account tier a client must hold to connect.
pub const ACCOUNT_REQ: &str = "PREMIUM";

/// OAuth-style scope string advertised in `getInfo`.
pub const SCOPE: &str = "streaming,client-authorization-universal";

/// Token type advertised in `getInfo`.
pub const TOKEN_TYPE: &str = "default";

/// Group status advertised in `getInfo` (this device never leads a group).
pub const GROUP_STATUS: &str = "NONE";

/// Resolver version advertised in `getInfo`.
pub const RESOLVER_VERSION: &str = "0";

/// Voice assistant support flag advertised in `getInfo`.
pub const VOICE_SUPPORT: &str = "NO";

// ─────────────────────────────────────────────────────────────────────────────
// Request Limits
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum size of the request line plus headers (bytes).
pub const MAX_HEADER_SECTION_SIZE: usize = 16 * 1024;

/// Maximum accepted POST body (bytes).
///
/// A credential blob is a few hundred bytes; anything larger is not a client.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Credential Blob
// ─────────────────────────────────────────────────────────────────────────────

/// Length of the AES-CTR initialization vector prefixing the blob.
pub const BLOB_IV_LEN: usize = 16;

/// Length of the HMAC-SHA1 checksum suffixing the blob.
pub const BLOB_MAC_LEN: usize = 20;

/// Length of the base key taken from `SHA1(shared_secret)`.
pub const BASE_KEY_LEN: usize = 16;

/// Length of the AES-128 key taken from the derived encryption key.
pub const AES_KEY_LEN: usize = 16;

/// HMAC label used to derive the checksum key.
pub const CHECKSUM_LABEL: &[u8] = b"checksum";

/// HMAC label used to derive the encryption key.
pub const ENCRYPTION_LABEL: &[u8] = b"encryption";

// ─────────────────────────────────────────────────────────────────────────────
// Diffie-Hellman
// ─────────────────────────────────────────────────────────────────────────────

/// RFC 2409 Oakley group 1 prime (768-bit MODP), big-endian.
pub const DH_PRIME: [u8; 96] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2,
    0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1, 0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67,
    0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e,
    0x34, 0x04, 0xdd, 0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
    0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45, 0xe4, 0x85, 0xb5,
    0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x3a, 0x36, 0x20, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// Generator for [`DH_PRIME`].
pub const DH_GENERATOR: u32 = 2;

/// Number of random bytes in a DH private key.
pub const DH_PRIVATE_KEY_LEN: usize = 95;

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// DNS-SD service type for Spotify Connect.
pub const MDNS_SERVICE_TYPE: &str = "_spotify-connect._tcp.local.";

/// Path clients should use for zeroconf requests (TXT `CPath`).
pub const MDNS_CPATH: &str = "/";

/// Zeroconf TXT record version.
pub const MDNS_TXT_VERSION: &str = "1.0";

/// Lowest port accepted for an explicitly configured listener.
pub const MIN_LISTEN_PORT: u16 = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Brand shown by Connect clients.
pub const BRAND_DISPLAY_NAME: &str = "snapspot";

/// Model shown by Connect clients.
pub const MODEL_DISPLAY_NAME: &str = "snapspot";

/// Library version advertised in `getInfo`.
pub const LIBRARY_VERSION: &str = concat!("snapspot-", env!("CARGO_PKG_VERSION"));

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// File (inside the data directory) holding the persisted device identity.
pub const DEVICE_FILE_NAME: &str = "device.json";

/// Length in bytes of a generated device id before hex encoding.
pub const DEVICE_ID_BYTES: usize = 20;
