//! Type definitions for the proxy module

use nutype::nutype;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ========== Identifier Types ==========

/// Identifier correlating every log line and error produced by one exchange
#[nutype(derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Deserialize, Serialize, From, AsRef))]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Create a new ExchangeId backed by a v7 (time-ordered) UUID
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

// ========== Configuration Types ==========

/// Root directory (relative or absolute) under which captured files are written
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Clone, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
)]
pub struct StorageRoot(String);

/// Number of body chunks buffered between the intercept task and the client connection
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |capacity: &usize| *capacity > 0),
)]
pub struct ClientBufferChunks(usize);

// ========== Constants ==========

/// Default address the proxy listens on
pub const DEFAULT_BIND: &str = "0.0.0.0:9999";

/// Default archive root directory name
pub const DEFAULT_ARCHIVE_ROOT: &str = "archive";

/// Default client-capture root directory name
pub const DEFAULT_CLIENT_ROOT: &str = "client";

/// Default upstream round-trip timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of chunks buffered toward the client
pub const DEFAULT_CLIENT_BUFFER_CHUNKS: usize = 16;

/// Proxy engine configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Upper bound on a single upstream round trip (connect + response head)
    pub request_timeout: Duration,
    /// Body chunks buffered toward the client before the copy loop waits
    pub client_buffer_chunks: ClientBufferChunks,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            client_buffer_chunks: ClientBufferChunks::try_new(DEFAULT_CLIENT_BUFFER_CHUNKS)
                .expect("default buffer capacity is non-zero"),
        }
    }
}

/// Errors that end a single exchange before its response reaches the interceptor
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Request has no Host header and no absolute target")]
    MissingHost,

    #[error("Invalid target URI: {0}")]
    InvalidTargetUri(String),

    #[error("Upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
