//! The unit of work flowing through the interception pipeline
//!
//! An [`Exchange`] pairs the request the client sent with the response the
//! upstream origin produced. It is owned by exactly one intercept task and
//! never shared between exchanges.

use crate::proxy::headers::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use crate::proxy::types::ExchangeId;
use axum::body::Body;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use parking_lot::Mutex;
use std::net::SocketAddr;

/// Host name used for paths when a target carries no authority
pub const UNKNOWN_HOST: &str = "unknown-host";

/// One client request paired with the upstream response it produced
#[derive(Debug)]
pub struct Exchange {
    id: ExchangeId,
    method: Method,
    target: Uri,
    remote_addr: SocketAddr,
    status: StatusCode,
    headers: HeaderMap,
    // Hooks borrow the exchange across await points, so it must be `Sync`;
    // the body itself is not. Only `&mut self` methods reach inside.
    body: Mutex<Option<Body>>,
    // upstream framing headers no longer describe the body
    body_replaced: bool,
    bytes_copied: u64,
}

impl Exchange {
    /// Pair an upstream response with the request that produced it
    pub fn new(
        id: ExchangeId,
        method: Method,
        target: Uri,
        remote_addr: SocketAddr,
        response: Response<Body>,
    ) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            id,
            method,
            target,
            remote_addr,
            status: parts.status,
            headers: parts.headers,
            body: Mutex::new(Some(body)),
            body_replaced: false,
            bytes_copied: 0,
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute URI of the upstream resource
    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Target host, including a port when one was given, without user info
    pub fn host(&self) -> &str {
        self.target
            .authority()
            .map(|authority| authority.as_str())
            .and_then(|authority| authority.rsplit('@').next())
            .filter(|host| !host.is_empty())
            .unwrap_or(UNKNOWN_HOST)
    }

    /// Path component of the target URI
    pub fn path(&self) -> &str {
        self.target.path()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// `Content-Type` value, or an empty string when absent or not visible ASCII
    pub fn content_type(&self) -> &str {
        self.header_str(CONTENT_TYPE)
    }

    /// `Content-Encoding` value, or an empty string when absent
    pub fn content_encoding(&self) -> &str {
        self.header_str(CONTENT_ENCODING)
    }

    pub fn is_gzip_encoded(&self) -> bool {
        self.content_encoding().trim().eq_ignore_ascii_case("gzip")
    }

    /// Remove the body; the client then receives an empty one.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body_replaced = true;
        self.body.get_mut().take()
    }

    /// Hand the body to the copy loop once the head is committed
    pub(crate) fn body_for_copy(&mut self) -> Option<Body> {
        self.body.get_mut().take()
    }

    /// Replace the body the client will receive
    pub fn set_body(&mut self, body: Body) {
        *self.body.get_mut() = Some(body);
        self.body_replaced = true;
    }

    /// Whether a hook swapped the upstream body
    pub fn body_replaced(&self) -> bool {
        self.body_replaced
    }

    /// Make `Content-Length` describe a replaced body: its exact length when
    /// known up front, otherwise no length at all so the body is chunked.
    pub(crate) fn reframe_replaced_body(&mut self) {
        if !self.body_replaced {
            return;
        }
        let exact = match self.body.get_mut() {
            Some(body) => http_body::Body::size_hint(body).exact(),
            None => Some(0),
        };
        match exact {
            Some(len) => {
                self.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            }
            None => {
                self.headers.remove(CONTENT_LENGTH);
            }
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.lock().is_some()
    }

    /// Body bytes read from upstream and fanned out; set before loggers run
    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied
    }

    pub(crate) fn record_copied(&mut self, bytes: u64) {
        self.bytes_copied = bytes;
    }

    fn header_str(&self, name: http::header::HeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
    }
}
