//! Line-oriented request/response framing.
//!
//! A strict subset of HTTP/1.1 message syntax, one exchange per connection:
//!
//! ```text
//! VERB SP target SP version CRLF
//! Name: value CRLF
//! ...
//! CRLF
//! [Content-Length bytes of body]
//! ```
//!
//! Responses always carry `Content-Type: application/json` and an exact byte
//! `Content-Length`.

use crate::config::TransportConfig;
use crate::envelope::{Headers, ResponseEnvelope};
use crate::error::reason_phrase;
use crate::{Result, RpcError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub verb: String,
    pub target: String,
    pub version: String,
}

/// Split a request line into verb, target and version.
///
/// Fewer than three space-separated tokens is malformed.
pub fn parse_request_line(line: &str) -> Result<RequestLine> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(verb), Some(target), Some(version)) => Ok(RequestLine {
            verb: verb.to_string(),
            target: target.to_string(),
            version: version.to_string(),
        }),
        _ => Err(RpcError::MalformedRequest("Invalid request line.".to_string())),
    }
}

/// Read the `Content-Length` header.
///
/// Returns `Ok(None)` when absent and an error when present but not an integer.
pub fn content_length(headers: &Headers) -> Result<Option<i64>> {
    match headers.get("Content-Length") {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            RpcError::MalformedRequest(format!("Invalid Content-Length header: {}", raw))
        }),
    }
}

/// Read one line, without its line terminator.
///
/// Returns `None` on EOF before any byte was read.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let read = reader.read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Read header lines until a blank line or EOF.
///
/// Each line splits on its first colon; lines without one are skipped.
pub async fn read_headers<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Headers> {
    let mut headers = Headers::new();
    while let Some(line) = read_line(reader).await? {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim(), value.trim());
        }
    }
    Ok(headers)
}

/// Read up to `len` body bytes, stopping early if the peer closes.
///
/// The buffer grows with the bytes actually received, never with the declared
/// length. The caller decides whether a short body is acceptable.
pub async fn read_body<R: AsyncBufRead + Unpin>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(len.min(TransportConfig::INITIAL_BODY_CAPACITY));
    reader.take(len as u64).read_to_end(&mut body).await?;
    Ok(body)
}

/// Write a framed response and flush it.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &ResponseEnvelope,
) -> Result<()> {
    let head = format!(
        "{} {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        TransportConfig::HTTP_VERSION,
        response.status,
        reason_phrase(response.status),
        TransportConfig::CONTENT_TYPE,
        response.body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(response.body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a framed request and flush it. A `Content-Length` is sent only with a body.
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    verb: &str,
    target: &str,
    host: &str,
    body: Option<&str>,
) -> Result<()> {
    let mut head = format!(
        "{} {} {}\r\nHost: {}\r\n",
        verb,
        target,
        TransportConfig::HTTP_VERSION,
        host
    );
    if let Some(body) = body {
        head.push_str(&format!(
            "Content-Type: {}\r\nContent-Length: {}\r\n",
            TransportConfig::CONTENT_TYPE,
            body.len()
        ));
    }
    head.push_str("\r\n");

    writer.write_all(head.as_bytes()).await?;
    if let Some(body) = body {
        writer.write_all(body.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read a framed response: status line, headers, then the body.
///
/// Without a `Content-Length` the body extends to EOF.
pub async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<ResponseEnvelope> {
    let status_line = read_line(reader)
        .await?
        .ok_or_else(|| RpcError::MalformedRequest("Empty response".to_string()))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            RpcError::MalformedRequest(format!("Invalid status line: {}", status_line))
        })?;

    let headers = read_headers(reader).await?;
    let body = match content_length(&headers)? {
        Some(len) if len > 0 => read_body(reader, len as usize).await?,
        Some(_) => Vec::new(),
        None => {
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest).await?;
            rest
        }
    };

    Ok(ResponseEnvelope::new(
        status,
        String::from_utf8_lossy(&body).into_owned(),
    ))
}
