//! Raw response encoding.
//!
//! Responses are written byte-for-byte; there is no chunked encoding and no
//! implicit headers. Whether a `Content-Length` header is sent is decided per
//! response because clients expect `getInfo` without one and `addUser` with
//! one.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Response statuses used by the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Forbidden,
    InternalServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// A fully formed response ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Response {
    /// Status line only, no headers and no body.
    pub fn status_only(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// JSON body with a `Content-Type` header and no `Content-Length`.
    pub fn json_unsized(status: Status, body: String) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.into_bytes(),
        }
    }

    /// JSON body with `Content-Type` and `Content-Length` headers.
    pub fn json_sized(status: Status, body: String) -> Self {
        let body = body.into_bytes();
        Self {
            status,
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("Content-Length", body.len().to_string()),
            ],
            body,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Encodes the response using the request's protocol version.
    pub fn encode(&self, version: &str) -> Vec<u8> {
        let mut out = format!(
            "{} {} {}\r\n",
            version,
            self.status.code(),
            self.status.reason()
        )
        .into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Writes and flushes the encoded response.
    pub async fn write_to<W>(&self, writer: &mut W, version: &str) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode(version)).await?;
        writer.flush().await
    }
}
