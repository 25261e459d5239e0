//! HTTP-upgrade handshake.
//!
//! Reads the upgrade request line by line, validates it, and answers
//! with the 101 response carrying the derived accept key. A failure
//! drops the connection before it ever reaches the open state; no close
//! frame is owed to a peer that never finished shaking hands.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::server::ServerConfig;

/// Fixed GUID appended to the client key before hashing.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Per-line read deadline while the request is being received.
const LINE_TIMEOUT: Duration = Duration::from_secs(3);

/// Handshake failures.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request line deadline exceeded")]
    Timeout,

    #[error("malformed request line: {0:?}")]
    BadRequestLine(String),

    #[error("invalid HTTP request type")]
    InvalidRequestType,

    #[error("missing or invalid header: {0}")]
    InvalidHeader(&'static str),

    #[error("origin not allowed: {0:?}")]
    OriginNotAllowed(String),
}

/// Parsed upgrade request: method, HTTP version, lowercased header map.
#[derive(Debug)]
pub struct UpgradeRequest {
    pub method: String,
    pub version: String,
    pub headers: HashMap<String, String>,
}

/// Runs the server side of the handshake: read, validate, respond.
pub async fn accept<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &ServerConfig,
) -> Result<(), HandshakeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = read_request(reader).await?;
    validate(&request, config)?;

    let key = request
        .headers
        .get("sec-websocket-key")
        .ok_or(HandshakeError::InvalidHeader("Sec-WebSocket-Key"))?;
    let accept = accept_key(key);

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    writer.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Derives the accept key: SHA-1 over the client key and the fixed
/// GUID, base64-encoded.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Reads request lines up to the blank line separating headers from
/// whatever follows.
async fn read_request<R>(reader: &mut R) -> Result<UpgradeRequest, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let first = read_line(reader).await?;
    let mut parts = first.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| HandshakeError::BadRequestLine(first.clone()))?
        .to_string();
    let version = parts
        .last()
        .and_then(|token| token.strip_prefix("HTTP/"))
        .ok_or_else(|| HandshakeError::BadRequestLine(first.clone()))?
        .to_string();

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        // Lines without a separator are skipped rather than fatal.
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(UpgradeRequest {
        method,
        version,
        headers,
    })
}

async fn read_line<R>(reader: &mut R) -> Result<String, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = tokio::time::timeout(LINE_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| HandshakeError::Timeout)??;
    if n == 0 {
        return Err(HandshakeError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed during handshake",
        )));
    }
    Ok(line.trim_end().to_string())
}

fn validate(request: &UpgradeRequest, config: &ServerConfig) -> Result<(), HandshakeError> {
    if request.method != "GET" {
        return Err(HandshakeError::InvalidRequestType);
    }
    let version: f64 = request
        .version
        .parse()
        .map_err(|_| HandshakeError::InvalidRequestType)?;
    if version < 1.1 {
        return Err(HandshakeError::InvalidRequestType);
    }

    expect_header(request, "upgrade", "websocket", "Upgrade")?;
    expect_header(request, "connection", "Upgrade", "Connection")?;
    expect_header(
        request,
        "sec-websocket-version",
        "13",
        "Sec-WebSocket-Version",
    )?;

    if config.production {
        let origin = request
            .headers
            .get("origin")
            .map(String::as_str)
            .unwrap_or("");
        if !config.allowed_origins.iter().any(|allowed| allowed == origin) {
            return Err(HandshakeError::OriginNotAllowed(origin.to_string()));
        }
    }
    Ok(())
}

fn expect_header(
    request: &UpgradeRequest,
    name: &str,
    expected: &str,
    display: &'static str,
) -> Result<(), HandshakeError> {
    match request.headers.get(name) {
        Some(value) if value.eq_ignore_ascii_case(expected) => Ok(()),
        _ => Err(HandshakeError::InvalidHeader(display)),
    }
}
