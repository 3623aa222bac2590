//! HTTP header constants and utilities for the proxy service
//!
//! This module centralizes the header names the proxy treats specially and
//! the header-copy helpers used when committing a response to the client and
//! when serializing a response head to disk.

use ::http::header::{self, HeaderMap, HeaderName};
use ::http::StatusCode;

/// Header name for the exchange id echoed on error responses
pub const X_REQUEST_ID: &str = "x-request-id";

/// Legacy header some clients send instead of `Connection`
pub const PROXY_CONNECTION: &str = "proxy-connection";

/// Standard header re-exports for convenience
pub use header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};

/// Well-known paths
pub mod paths {
    /// Default path when none is specified
    pub const DEFAULT: &str = "/";
}

/// Headers that describe a single connection rather than the resource.
/// They are never forwarded; each side's framing layer re-derives them.
pub fn hop_by_hop_headers() -> [HeaderName; 9] {
    [
        header::CONNECTION,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static(PROXY_CONNECTION),
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
}

/// Replace every header in `dst` with the headers of `src`, keeping all values
/// of multi-valued headers in their original order.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    dst.clear();
    for (name, value) in src {
        dst.append(name.clone(), value.clone());
    }
}

/// Remove hop-by-hop headers, including any extra names listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(hop_by_hop_headers().iter()) {
        headers.remove(name);
    }
}

/// Serialize headers as `Name: value` lines terminated by CRLF, one line per value.
pub fn header_block(headers: &HeaderMap) -> Vec<u8> {
    let mut block = Vec::new();
    for (name, value) in headers {
        block.extend_from_slice(name.as_str().as_bytes());
        block.extend_from_slice(b": ");
        block.extend_from_slice(value.as_bytes());
        block.extend_from_slice(b"\r\n");
    }
    block
}

/// Serialize an HTTP/1.1 status line, headers and the blank separator line.
pub fn response_head(status: StatusCode, headers: &HeaderMap) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    head.extend_from_slice(&header_block(headers));
    head.extend_from_slice(b"\r\n");
    head
}
