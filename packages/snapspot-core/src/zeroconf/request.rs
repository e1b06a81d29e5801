//! Request parsing for the zeroconf endpoint.
//!
//! This is not a general HTTP parser. It reads exactly one request:
//!
//! 1. A request line of exactly three tokens: `METHOD PATH VERSION`
//! 2. Headers until an empty line
//! 3. For `POST`, exactly `Content-Length` bytes of form-encoded body
//!
//! Parameters come from the query string (non-POST) or the body (POST).

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::protocol_constants::{FORM_CONTENT_TYPE, MAX_BODY_SIZE, MAX_HEADER_SECTION_SIZE};

/// Errors that abort a request without a response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Connection closed before a complete request was read")]
    ConnectionClosed,

    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("Request headers exceed the size limit")]
    HeadersTooLarge,

    #[error("Unsupported content type: {0:?}")]
    UnsupportedContentType(Option<String>),

    #[error("Missing Content-Length")]
    MissingContentLength,

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("Request body of {0} bytes exceeds limit")]
    BodyTooLarge(usize),

    #[error("Timed out reading request")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Parses `&`-separated `key=value` pairs with form decoding.
    ///
    /// Pairs without `=` map to an empty value. Later duplicates win.
    pub fn parse(input: &str) -> Self {
        let map = input
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (decode_component(key), decode_component(value)),
                None => (decode_component(pair), String::new()),
            })
            .collect();
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// A parsed request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub params: Params,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

/// Reads one request from `reader`.
///
/// # Errors
///
/// Any [`RequestError`]; callers close the connection without responding.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_HEADER_SECTION_SIZE;

    let request_line = read_line(reader, &mut budget)
        .await?
        .ok_or(RequestError::ConnectionClosed)?;
    let (method, path, version) = parse_request_line(&request_line)?;

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader, &mut budget)
            .await?
            .ok_or(RequestError::ConnectionClosed)?;
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
            None => log::trace!("[Zeroconf] Ignoring header line without colon: {:?}", line),
        }
    }

    let params = if method == "POST" {
        let body = read_form_body(reader, &headers).await?;
        Params::parse(&body)
    } else {
        Params::parse(path.split_once('?').map(|(_, q)| q).unwrap_or(""))
    };

    Ok(Request {
        method,
        path,
        version,
        headers,
        params,
    })
}

fn parse_request_line(line: &str) -> Result<(String, String, String), RequestError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [method, path, version] => Ok((
            (*method).to_string(),
            (*path).to_string(),
            (*version).to_string(),
        )),
        _ => Err(RequestError::MalformedRequestLine(line.to_string())),
    }
}

async fn read_form_body<R>(
    reader: &mut R,
    headers: &HashMap<String, String>,
) -> Result<String, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let content_type = headers.get("content-type");
    let is_form = content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));
    if !is_form {
        return Err(RequestError::UnsupportedContentType(content_type.cloned()));
    }

    let raw_len = headers
        .get("content-length")
        .ok_or(RequestError::MissingContentLength)?;
    let len: usize = raw_len
        .parse()
        .map_err(|_| RequestError::InvalidContentLength(raw_len.clone()))?;
    if len > MAX_BODY_SIZE {
        return Err(RequestError::BodyTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RequestError::ConnectionClosed
        } else {
            RequestError::Io(e)
        }
    })?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Reads one CRLF or LF terminated line, charging it against `budget`.
///
/// Returns `None` on EOF before any byte was read.
async fn read_line<R>(reader: &mut R, budget: &mut usize) -> Result<Option<String>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(*budget as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        if *budget == 0 {
            return Err(RequestError::HeadersTooLarge);
        }
        return Ok(None);
    }
    *budget -= read;

    if buf.last() != Some(&b'\n') {
        if *budget == 0 {
            return Err(RequestError::HeadersTooLarge);
        }
        return Err(RequestError::ConnectionClosed);
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
