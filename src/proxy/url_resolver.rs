//! Upstream target resolution for transparent proxying
//!
//! The upstream is never configured: it is whatever the inbound request
//! names, either through an absolute-form request target
//! (`GET http://host/path`) or through its `Host` header.

use crate::proxy::headers::{paths, strip_hop_by_hop, HOST};
use crate::proxy::types::*;
use axum::body::Body;
use http::uri::{Authority, Scheme};
use http::{HeaderValue, Request, Uri, Version};

/// Strategy for resolving the upstream target of an inbound request
pub struct UrlResolver;

impl UrlResolver {
    /// Authority the request is addressed to: absolute-form target first, then `Host`
    pub fn target_authority<B>(request: &Request<B>) -> ProxyResult<Authority> {
        if let Some(authority) = request.uri().authority() {
            return Ok(authority.clone());
        }

        let host = request
            .headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or(ProxyError::MissingHost)?;

        host.parse()
            .map_err(|_| ProxyError::InvalidTargetUri(format!("invalid Host header '{host}'")))
    }

    /// Resolve the absolute upstream URI, always over plain HTTP
    pub fn resolve_target_uri<B>(request: &Request<B>) -> ProxyResult<Uri> {
        let authority = Self::target_authority(request)?;
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(paths::DEFAULT);

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidTargetUri(e.to_string()))
    }
}

/// Build the outbound request: same method, headers and body, HTTP/1.1,
/// keep-alive, addressed to the host the client asked for.
pub fn build_outbound_request(request: Request<Body>) -> ProxyResult<Request<Body>> {
    let target = UrlResolver::resolve_target_uri(&request)?;
    // userinfo never reaches the Host header
    let host = target
        .authority()
        .map(|authority| match authority.port_u16() {
            Some(port) => format!("{}:{port}", authority.host()),
            None => authority.host().to_string(),
        })
        .ok_or(ProxyError::MissingHost)?;

    let (mut parts, body) = request.into_parts();
    parts.uri = target;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    parts.headers.insert(
        HOST,
        HeaderValue::from_str(&host)
            .map_err(|_| ProxyError::InvalidTargetUri(format!("invalid host '{host}'")))?,
    );

    Ok(Request::from_parts(parts, body))
}
