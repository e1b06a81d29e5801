//! Connect handshake handler.
//!
//! Handles exactly one request per connection over any byte stream, so the
//! same code serves TCP sockets and in-memory test transports.
//!
//! - `getInfo`: device description and the DH public key
//! - `addUser`: verifies and decrypts a credential blob, then hands the
//!   credentials to the [`SessionRepository`]
//!
//! Anything else is closed without a response.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::info::{add_user_success_body, GetInfoTemplate};
use super::pending::{PendingConnection, PendingError, PendingGuard};
use super::request::{read_request, Request, RequestError};
use super::response::{Response, Status};
use crate::crypto::{CredentialDecryptor, KeyExchange};
use crate::error::{ConnectError, ConnectResult, ErrorCode};
use crate::events::{EventEmitter, ZeroconfEvent};
use crate::identity::DeviceIdentity;
use crate::protocol_constants::{ACTION_ADD_USER, ACTION_GET_INFO, ACTION_PARAM};
use crate::session::{SessionError, SessionParams, SessionRepository, SessionState};
use crate::utils::now_millis;

/// What a handled connection amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// `getInfo` was answered.
    InfoServed,
    /// `addUser` was accepted; `session` is the resolved creation result.
    UserAdded {
        username: String,
        session: Result<SessionState, SessionError>,
    },
    /// No recognized action; closed without a response.
    Ignored,
}

/// Serves `getInfo` and `addUser` requests.
pub struct ConnectHandler {
    decryptor: CredentialDecryptor,
    info: GetInfoTemplate,
    pending: Arc<PendingConnection>,
    sessions: Arc<SessionRepository>,
    emitter: Arc<dyn EventEmitter>,
    read_timeout: Option<Duration>,
}

impl ConnectHandler {
    pub fn new(
        identity: &DeviceIdentity,
        key_exchange: Arc<KeyExchange>,
        pending: Arc<PendingConnection>,
        sessions: Arc<SessionRepository>,
        emitter: Arc<dyn EventEmitter>,
        read_timeout: Option<Duration>,
    ) -> Self {
        let info = GetInfoTemplate::new(identity, &key_exchange.public_key_base64());
        Self {
            decryptor: CredentialDecryptor::new(key_exchange),
            info,
            pending,
            sessions,
            emitter,
            read_timeout,
        }
    }

    /// Reads one request from `stream` and answers it.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the exchange. When
    /// [`ConnectError::status`] is `Some`, that status was already written.
    pub async fn handle<S>(&self, stream: S) -> ConnectResult<HandleOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let request = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read_request(&mut reader))
                .await
                .map_err(|_| RequestError::Timeout)??,
            None => read_request(&mut reader).await?,
        };

        match request.param(ACTION_PARAM) {
            Some(ACTION_GET_INFO) => {
                self.get_info(&request, &mut write_half).await?;
                Ok(HandleOutcome::InfoServed)
            }
            Some(ACTION_ADD_USER) => self.add_user(&request, &mut write_half).await,
            other => {
                log::debug!(
                    "[Zeroconf] Ignoring {} {} with action {:?}",
                    request.method,
                    request.path,
                    other
                );
                Ok(HandleOutcome::Ignored)
            }
        }
    }

    async fn get_info<W>(&self, request: &Request, writer: &mut W) -> ConnectResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let active_user = self
            .pending
            .current()
            .or_else(|| self.sessions.active_username())
            .unwrap_or_default();

        Response::json_unsized(Status::Ok, self.info.render(&active_user))
            .write_to(writer, &request.version)
            .await?;

        self.emitter.emit_zeroconf(ZeroconfEvent::InfoRequested {
            timestamp: now_millis(),
        });
        Ok(())
    }

    async fn add_user<W>(&self, request: &Request, writer: &mut W) -> ConnectResult<HandleOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let username = required(request, "userName")?;
        let blob = required(request, "blob")?;
        let client_key = required(request, "clientKey")?;
        let device_name = request.param("deviceName").map(str::to_string);

        let (guard, decrypted) = match self.open_credentials(username, blob, client_key) {
            Ok(opened) => opened,
            Err(e) => {
                self.reject(request, writer, username, &e).await;
                return Err(e);
            }
        };

        log::info!(
            "[Zeroconf] Accepted credentials for {} from {}",
            username,
            device_name.as_deref().unwrap_or("unknown device")
        );
        self.emitter.emit_zeroconf(ZeroconfEvent::UserAdded {
            username: username.to_string(),
            device_name: device_name.clone(),
            timestamp: now_millis(),
        });

        // State is Creating before the client sees the success response.
        let ticket = self.sessions.submit(SessionParams {
            username: username.to_string(),
            blob: decrypted,
            device_name,
        });

        Response::json_sized(Status::Ok, add_user_success_body())
            .write_to(writer, &request.version)
            .await?;
        if let Err(e) = writer.shutdown().await {
            log::debug!("[Zeroconf] Shutdown after addUser failed: {}", e);
        }

        // The slot stays claimed until the session resolves so a retry for
        // the same user during creation is refused.
        let session = match ticket {
            Ok(ticket) => ticket.outcome().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &session {
            log::warn!("[Zeroconf] Session for {} not started: {}", username, e);
        }
        drop(guard);

        Ok(HandleOutcome::UserAdded {
            username: username.to_string(),
            session,
        })
    }

    /// Claims the pending slot, then verifies and decrypts the blob.
    fn open_credentials(
        &self,
        username: &str,
        blob: &str,
        client_key: &str,
    ) -> ConnectResult<(PendingGuard, Vec<u8>)> {
        // The slot can be displaced by another user while this username is
        // still being created, so the repository state counts as in flight.
        if matches!(
            self.sessions.state(),
            SessionState::Creating { username: ref creating } if creating == username
        ) {
            return Err(PendingError::Occupied(username.to_string()).into());
        }
        let guard = self.pending.try_acquire(username)?;
        let blob = decode_base64("blob", blob)?;
        let client_key = decode_base64("clientKey", client_key)?;
        let decrypted = self.decryptor.decrypt(&client_key, &blob)?;
        Ok((guard, decrypted))
    }

    async fn reject<W>(&self, request: &Request, writer: &mut W, username: &str, err: &ConnectError)
    where
        W: AsyncWrite + Unpin,
    {
        log::warn!("[Zeroconf] Rejected addUser for {}: {}", username, err);
        if let Some(status) = err.status() {
            if let Err(e) = Response::status_only(status)
                .write_to(writer, &request.version)
                .await
            {
                log::debug!("[Zeroconf] Failed to write {} response: {}", status.code(), e);
            }
        }
        self.emitter.emit_zeroconf(ZeroconfEvent::UserRejected {
            username: username.to_string(),
            reason: err.code().to_string(),
            timestamp: now_millis(),
        });
    }
}

fn required<'a>(request: &'a Request, name: &'static str) -> ConnectResult<&'a str> {
    request
        .param(name)
        .ok_or(ConnectError::MissingParameter(name))
}

fn decode_base64(param: &'static str, value: &str) -> ConnectResult<Vec<u8>> {
    BASE64
        .decode(value.trim())
        .map_err(|e| ConnectError::InvalidBase64 {
            param,
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::BlobKeys;
    use crate::events::NoopEventEmitter;
    use crate::identity::DeviceType;
    use crate::runtime::TokioSpawner;
    use crate::test_fixtures::FakeAuthenticator;
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    use tokio::io::{AsyncReadExt, DuplexStream};

    struct Harness {
        handler: Arc<ConnectHandler>,
        auth: Arc<FakeAuthenticator>,
        sessions: Arc<SessionRepository>,
        pending: Arc<PendingConnection>,
        key_exchange: Arc<KeyExchange>,
    }

    fn harness(auth: Arc<FakeAuthenticator>) -> Harness {
        let identity = DeviceIdentity {
            device_type: DeviceType::Speaker,
            name: "Kitchen".into(),
            id: "0f".repeat(20),
            locale: "en".into(),
        };
        let key_exchange = Arc::new(KeyExchange::generate());
        let sessions = Arc::new(SessionRepository::new(
            auth.clone(),
            Arc::new(NoopEventEmitter),
            TokioSpawner::current(),
        ));
        let pending = Arc::new(PendingConnection::new());
        let handler = Arc::new(ConnectHandler::new(
            &identity,
            Arc::clone(&key_exchange),
            Arc::clone(&pending),
            Arc::clone(&sessions),
            Arc::new(NoopEventEmitter),
            Some(Duration::from_secs(5)),
        ));
        Harness {
            handler,
            auth,
            sessions,
            pending,
            key_exchange,
        }
    }

    fn encode(value: &str) -> String {
        utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
    }

    /// Builds an `addUser` body the way a Connect client would.
    fn add_user_body(server: &KeyExchange, username: &str, plaintext: &[u8]) -> (String, Vec<u8>) {
        let client = KeyExchange::generate();
        let shared = client.shared_secret(&server.public_key()).unwrap();
        let blob = BlobKeys::derive(&shared)
            .unwrap()
            .seal(&[9u8; 16], plaintext)
            .unwrap();
        let body = format!(
            "action=addUser&userName={}&blob={}&clientKey={}&deviceName=Phone",
            encode(username),
            encode(&BASE64.encode(&blob)),
            encode(&BASE64.encode(client.public_key())),
        );
        (body, blob)
    }

    fn post(body: &str) -> Vec<u8> {
        format!(
            "POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    fn spawn_handle(
        handler: &Arc<ConnectHandler>,
        server: DuplexStream,
    ) -> tokio::task::JoinHandle<ConnectResult<HandleOutcome>> {
        let handler = Arc::clone(handler);
        tokio::spawn(async move { handler.handle(server).await })
    }

    async fn send(client: &mut DuplexStream, raw: &[u8]) -> String {
        client.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    async fn exchange(
        handler: &Arc<ConnectHandler>,
        raw: &[u8],
    ) -> (ConnectResult<HandleOutcome>, String) {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = spawn_handle(handler, server);
        let response = send(&mut client, raw).await;
        (task.await.unwrap(), response)
    }

    #[tokio::test]
    async fn get_info_returns_json_without_length() {
        let h = harness(FakeAuthenticator::accepting());

        let (outcome, response) =
            exchange(&h.handler, b"GET /?action=getInfo HTTP/1.1\r\nHost: x\r\n\r\n").await;

        assert_eq!(outcome.unwrap(), HandleOutcome::InfoServed);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n"));
        assert!(!response.contains("Content-Length"));
        assert!(response.contains("\"deviceType\":\"SPEAKER\""));

        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["publicKey"], h.key_exchange.public_key_base64());
        assert_eq!(value["activeUser"], "");
    }

    #[tokio::test]
    async fn add_user_round_trip_creates_session() {
        let h = harness(FakeAuthenticator::accepting());
        let (body, _) = add_user_body(&h.key_exchange, "alice@example.com", b"stored credential");

        let (outcome, response) = exchange(&h.handler, &post(&body)).await;

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        let expected_body = add_user_success_body();
        assert!(response.contains(&format!("Content-Length: {}\r\n", expected_body.len())));
        assert!(response.ends_with(&expected_body));

        match outcome.unwrap() {
            HandleOutcome::UserAdded { username, session } => {
                assert_eq!(username, "alice@example.com");
                assert!(matches!(session, Ok(SessionState::Created(_))));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.auth.last_blob().unwrap(), b"stored credential");
    }

    #[tokio::test]
    async fn get_info_reports_active_user() {
        let h = harness(FakeAuthenticator::accepting());
        let (body, _) = add_user_body(&h.key_exchange, "alice", b"x");
        exchange(&h.handler, &post(&body)).await.0.unwrap();

        let (_, response) =
            exchange(&h.handler, b"GET /?action=getInfo HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("\"activeUser\":\"alice\""));
    }

    #[tokio::test]
    async fn flipped_mac_byte_is_bad_request_without_auth_call() {
        let h = harness(FakeAuthenticator::accepting());
        let (body, blob) = add_user_body(&h.key_exchange, "alice", b"payload");

        let mut tampered = blob.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        let body = body.replace(
            &encode(&BASE64.encode(&blob)),
            &encode(&BASE64.encode(&tampered)),
        );

        let (outcome, response) = exchange(&h.handler, &post(&body)).await;

        assert_eq!(response, "HTTP/1.1 400 Bad Request\r\n\r\n");
        assert!(matches!(
            outcome,
            Err(ConnectError::Blob(crate::crypto::BlobError::MacMismatch))
        ));
        assert_eq!(h.auth.calls(), 0);
        assert_eq!(h.sessions.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn flipped_ciphertext_byte_leaves_state_idle() {
        let h = harness(FakeAuthenticator::accepting());
        let (body, blob) = add_user_body(&h.key_exchange, "alice", b"payload");

        let mut tampered = blob.clone();
        tampered[16] ^= 0x01;
        let body = body.replace(
            &encode(&BASE64.encode(&blob)),
            &encode(&BASE64.encode(&tampered)),
        );

        let (_, response) = exchange(&h.handler, &post(&body)).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
        assert_eq!(h.sessions.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn invalid_client_key_is_internal_error() {
        let h = harness(FakeAuthenticator::accepting());
        let body = format!(
            "action=addUser&userName=alice&blob={}&clientKey={}",
            encode(&BASE64.encode([0u8; 64])),
            encode(&BASE64.encode([0u8])),
        );

        let (outcome, response) = exchange(&h.handler, &post(&body)).await;

        assert_eq!(response, "HTTP/1.1 500 Internal Server Error\r\n\r\n");
        assert!(outcome.is_err());
        assert_eq!(h.auth.calls(), 0);
    }

    #[tokio::test]
    async fn undecodable_base64_is_bad_request() {
        let h = harness(FakeAuthenticator::accepting());
        let body = "action=addUser&userName=alice&blob=%21%21%21&clientKey=AAAA";

        let (outcome, response) = exchange(&h.handler, &post(body)).await;

        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
        assert!(matches!(
            outcome,
            Err(ConnectError::InvalidBase64 { param: "blob", .. })
        ));
    }

    #[tokio::test]
    async fn missing_parameter_closes_silently() {
        let h = harness(FakeAuthenticator::accepting());

        let (outcome, response) =
            exchange(&h.handler, &post("action=addUser&userName=alice&blob=AAAA")).await;

        assert!(response.is_empty());
        assert!(matches!(
            outcome,
            Err(ConnectError::MissingParameter("clientKey"))
        ));
    }

    #[tokio::test]
    async fn malformed_request_line_closes_silently() {
        let h = harness(FakeAuthenticator::accepting());

        let (outcome, response) = exchange(&h.handler, b"GET\r\n\r\n").await;

        assert!(response.is_empty());
        assert!(matches!(
            outcome,
            Err(ConnectError::Request(RequestError::MalformedRequestLine(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_action_is_ignored() {
        let h = harness(FakeAuthenticator::accepting());

        let (outcome, response) =
            exchange(&h.handler, b"GET /?action=resetUsers HTTP/1.1\r\n\r\n").await;

        assert_eq!(outcome.unwrap(), HandleOutcome::Ignored);
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn concurrent_same_user_gets_forbidden() {
        let h = harness(FakeAuthenticator::gated());
        let (first_body, _) = add_user_body(&h.key_exchange, "alice", b"one");
        let (second_body, _) = add_user_body(&h.key_exchange, "alice", b"two");

        let (mut first_client, first_server) = tokio::io::duplex(64 * 1024);
        let first = spawn_handle(&h.handler, first_server);
        let first_response = send(&mut first_client, &post(&first_body)).await;
        assert!(first_response.starts_with("HTTP/1.1 200 OK"));

        // First submission is still authenticating.
        let (outcome, response) = exchange(&h.handler, &post(&second_body)).await;
        assert_eq!(response, "HTTP/1.1 403 Forbidden\r\n\r\n");
        assert!(matches!(outcome, Err(ConnectError::Conflict(_))));

        h.auth.release(1);
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, HandleOutcome::UserAdded { .. }));
        assert_eq!(h.auth.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_different_users_create_one_at_a_time() {
        let h = harness(FakeAuthenticator::gated());
        let (alice_body, _) = add_user_body(&h.key_exchange, "alice", b"a");
        let (bob_body, _) = add_user_body(&h.key_exchange, "bob", b"b");

        let (mut alice_client, alice_server) = tokio::io::duplex(64 * 1024);
        let alice = spawn_handle(&h.handler, alice_server);
        send(&mut alice_client, &post(&alice_body)).await;
        assert!(h.sessions.is_creating());

        let (outcome, response) = exchange(&h.handler, &post(&bob_body)).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        match outcome.unwrap() {
            HandleOutcome::UserAdded { session, .. } => {
                assert_eq!(session, Err(SessionError::CreationInProgress));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        h.auth.release(1);
        alice.await.unwrap().unwrap();
        assert_eq!(h.auth.calls(), 1);
        assert_eq!(h.sessions.active_username().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn same_user_is_refused_after_another_user_displaced_the_slot() {
        let h = harness(FakeAuthenticator::gated());
        let (alice_body, _) = add_user_body(&h.key_exchange, "alice", b"a");
        let (bob_body, _) = add_user_body(&h.key_exchange, "bob", b"b");
        let (alice_retry, _) = add_user_body(&h.key_exchange, "alice", b"a2");

        let (mut alice_client, alice_server) = tokio::io::duplex(64 * 1024);
        let alice = spawn_handle(&h.handler, alice_server);
        send(&mut alice_client, &post(&alice_body)).await;

        // Bob takes the slot, is refused by the repository and releases it.
        let (outcome, _) = exchange(&h.handler, &post(&bob_body)).await;
        assert!(matches!(
            outcome.unwrap(),
            HandleOutcome::UserAdded {
                session: Err(SessionError::CreationInProgress),
                ..
            }
        ));
        assert_eq!(h.pending.current(), None);

        let (outcome, response) = exchange(&h.handler, &post(&alice_retry)).await;
        assert_eq!(response, "HTTP/1.1 403 Forbidden\r\n\r\n");
        assert!(matches!(outcome, Err(ConnectError::Conflict(_))));

        let (_, response) =
            exchange(&h.handler, b"GET /?action=getInfo HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("\"activeUser\":\"alice\""));

        h.auth.release(1);
        alice.await.unwrap().unwrap();
        assert_eq!(h.auth.calls(), 1);
        assert_eq!(h.auth.last_blob().unwrap(), b"a");
    }

    #[tokio::test]
    async fn pending_slot_is_cleared_after_failure() {
        let h = harness(FakeAuthenticator::rejecting("denied"));
        let (body, _) = add_user_body(&h.key_exchange, "alice", b"x");

        let (outcome, _) = exchange(&h.handler, &post(&body)).await;
        match outcome.unwrap() {
            HandleOutcome::UserAdded { session, .. } => {
                assert!(matches!(session, Ok(SessionState::Error { .. })));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let (body, _) = add_user_body(&h.key_exchange, "alice", b"x");
        let (_, response) = exchange(&h.handler, &post(&body)).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_times_out() {
        let h = harness(FakeAuthenticator::accepting());
        let (mut client, server) = tokio::io::duplex(1024);
        let task = spawn_handle(&h.handler, server);

        client.write_all(b"GET /?action=getInfo HTTP/1.1\r\n").await.unwrap();

        let outcome = task.await.unwrap();
        assert!(matches!(
            outcome,
            Err(ConnectError::Request(RequestError::Timeout))
        ));
    }
}
