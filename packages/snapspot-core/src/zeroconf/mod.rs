//! Spotify Connect zeroconf endpoint.
//!
//! - [`listener`]: TCP accept loop and connection lifecycle
//! - [`handler`]: `getInfo` / `addUser` handshake
//! - [`request`] / [`response`]: minimal HTTP-shaped wire format
//! - [`pending`]: in-flight `addUser` slot

mod connection;
pub mod handler;
mod info;
pub mod listener;
pub mod pending;
pub mod request;
pub mod response;

pub use connection::{ConnectionGuard, ConnectionTracker};
pub use handler::{ConnectHandler, HandleOutcome};
pub use info::{add_user_success_body, GetInfoTemplate};
pub use listener::ZeroconfListener;
pub use pending::{PendingConnection, PendingError, PendingGuard};
pub use request::{read_request, Params, Request, RequestError};
pub use response::{Response, Status};
