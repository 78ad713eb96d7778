//! Minimal HTTP/1.1 framing for telemetry delivery
//!
//! The agent writes every request as:
//! ```text
//! POST <path> HTTP/1.1\r\n
//! Host: <host>\r\n
//! Connection: keep-alive | close\r\n
//! Content-Type: application/json\r\n
//! Content-Length: <body length>\r\n
//! \r\n
//! <body>
//! ```
//!
//! Nothing follows the body. Responses are never parsed beyond finding
//! the end of the header block; the collector side uses the decoder below
//! to read requests off a keep-alive stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum size of a request head accepted by the decoder
pub const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Maximum request body accepted by the decoder
pub const MAX_BODY_SIZE: usize = 64 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors that can occur while decoding a request
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed request line: {0:?}")]
    InvalidRequestLine(String),

    #[error("Malformed header line: {0:?}")]
    InvalidHeader(String),

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("Request head exceeds {MAX_HEADER_SIZE} bytes")]
    HeadTooLarge,

    #[error("Body too large: {0} bytes (max: {MAX_BODY_SIZE})")]
    BodyTooLarge(usize),
}

/// Value of the `Connection` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPolicy {
    KeepAlive,
    Close,
}

impl ConnectionPolicy {
    pub fn from_keep_alive(keep_alive: bool) -> Self {
        if keep_alive {
            Self::KeepAlive
        } else {
            Self::Close
        }
    }

    pub fn header_value(self) -> &'static str {
        match self {
            Self::KeepAlive => "keep-alive",
            Self::Close => "close",
        }
    }

    pub fn is_keep_alive(self) -> bool {
        self == Self::KeepAlive
    }
}

/// Encode a telemetry POST into a new buffer
pub fn encode_request(host: &str, path: &str, policy: ConnectionPolicy, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(160 + path.len() + host.len() + body.len());
    encode_request_into(host, path, policy, body, &mut buf);
    buf.freeze()
}

/// Encode a telemetry POST directly into a provided buffer
pub fn encode_request_into(
    host: &str,
    path: &str,
    policy: ConnectionPolicy,
    body: &[u8],
    buf: &mut BytesMut,
) {
    buf.put_slice(b"POST ");
    buf.put_slice(path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    put_header(buf, "Host", host);
    put_header(buf, "Connection", policy.header_value());
    put_header(buf, "Content-Type", "application/json");
    put_header(buf, "Content-Length", &body.len().to_string());
    buf.put_slice(b"\r\n");
    buf.put_slice(body);
}

/// Encode a collector response
pub fn encode_response(status: u16, reason: &str, policy: ConnectionPolicy, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(128 + body.len());
    buf.put_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
    put_header(&mut buf, "Connection", policy.header_value());
    put_header(&mut buf, "Content-Type", "application/json");
    put_header(&mut buf, "Content-Length", &body.len().to_string());
    buf.put_slice(b"\r\n");
    buf.put_slice(body);
    buf.freeze()
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}

/// Finds the end of a response header block.
///
/// Input is split into `\n`-terminated lines; the header block ends at the
/// first line consisting solely of `\r`. Bytes after that line are left to
/// the caller, which discards them.
#[derive(Debug, Default)]
pub struct HeaderScanner {
    line: Vec<u8>,
    complete: bool,
    lines: usize,
}

impl HeaderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes. Returns how many were consumed; fewer than
    /// `data.len()` only once the header block has ended.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        if self.complete {
            return 0;
        }

        for (i, &byte) in data.iter().enumerate() {
            if byte != b'\n' {
                // Only the "\r" comparison matters, so long lines are not kept
                if self.line.len() < 2 {
                    self.line.push(byte);
                } else {
                    self.line[1] = byte;
                }
                continue;
            }

            self.lines += 1;
            let blank = self.line.as_slice() == b"\r";
            self.line.clear();
            if blank {
                self.complete = true;
                return i + 1;
            }
        }

        data.len()
    }

    /// Whether the blank line ending the headers has been seen
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of complete lines seen so far
    pub fn lines(&self) -> usize {
        self.lines
    }
}

/// A decoded request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Connection policy requested by the client
    pub fn connection_policy(&self) -> ConnectionPolicy {
        match self.header("Connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => ConnectionPolicy::Close,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => ConnectionPolicy::KeepAlive,
            _ if self.version == "HTTP/1.1" => ConnectionPolicy::KeepAlive,
            _ => ConnectionPolicy::Close,
        }
    }
}

/// Try to decode one request from a buffer
///
/// Returns:
/// - `Ok(Some(request))` if a complete request was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode_request(buf: &mut BytesMut) -> Result<Option<Request>, CodecError> {
    let head_len = match find(buf, HEAD_TERMINATOR) {
        Some(pos) => pos,
        None if buf.len() > MAX_HEADER_SIZE => return Err(CodecError::HeadTooLarge),
        None => return Ok(None),
    };

    if head_len > MAX_HEADER_SIZE {
        return Err(CodecError::HeadTooLarge);
    }

    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v), None) if !m.is_empty() && p.starts_with('/') && v.starts_with("HTTP/") => {
            (m.to_string(), p.to_string(), v.to_string())
        }
        _ => return Err(CodecError::InvalidRequestLine(request_line.to_string())),
    };

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::InvalidHeader(line.to_string()))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let content_length = match headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
    {
        Some((_, value)) => value
            .parse::<usize>()
            .map_err(|_| CodecError::InvalidContentLength(value.clone()))?,
        None => 0,
    };

    if content_length > MAX_BODY_SIZE {
        return Err(CodecError::BodyTooLarge(content_length));
    }

    let total_len = head_len + HEAD_TERMINATOR.len() + content_length;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(head_len + HEAD_TERMINATOR.len());
    let body = buf.split_to(content_length).freeze();

    Ok(Some(Request {
        method,
        path,
        version,
        headers,
        body,
    }))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Streaming request decoder for keep-alive connections
#[derive(Debug, Default)]
pub struct RequestDecoder {
    /// Partial request data being accumulated
    buffer: BytesMut,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next request from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete requests
    pub fn decode_next(&mut self) -> Result<Option<Request>, CodecError> {
        decode_request(&mut self.buffer)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
