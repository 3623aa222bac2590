//! Capability interfaces for the three interception stages
//!
//! - [`Director`]: may change status, headers or body before anything is sent
//! - [`Writer`]: may open a [`Sink`] that receives a copy of the body
//! - [`Logger`]: read-only observation once the body has been delivered

use crate::proxy::exchange::Exchange;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure raised by a single hook; recovered locally by the pipeline
#[derive(Error, Debug)]
pub enum HookError {
    #[error("{hook}: I/O error on {}: {source}", .path.display())]
    Io {
        hook: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{hook}: {message}")]
    Failed { hook: String, message: String },
}

impl HookError {
    pub fn io(hook: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            hook: hook.into(),
            path: path.into(),
            source,
        }
    }

    pub fn failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// An open, write-only byte destination owned by the interceptor for one exchange.
///
/// `close` consumes the sink, so a sink can only ever be closed once.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    async fn close(self: Box<Self>) -> io::Result<()>;
}

/// What a [`Writer`] wants for the current exchange
pub enum WriterOutcome {
    /// Stream the body into this sink
    Stream(Box<dyn Sink>),
    /// The writer persisted everything it needed synchronously
    Completed,
    /// The writer is not interested in this exchange
    Skipped,
}

impl std::fmt::Debug for WriterOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream"),
            Self::Completed => f.write_str("Completed"),
            Self::Skipped => f.write_str("Skipped"),
        }
    }
}

/// Runs before the response head is committed; the only stage allowed to
/// change what the client sees.
#[async_trait]
pub trait Director: Send + Sync {
    fn name(&self) -> &str;

    async fn direct(&self, exchange: &mut Exchange) -> Result<(), HookError>;
}

/// Runs after the head is committed; must not depend on other writers.
#[async_trait]
pub trait Writer: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self, exchange: &Exchange) -> Result<WriterOutcome, HookError>;
}

/// Read-only observer run after the body copy and before sinks are closed.
#[async_trait]
pub trait Logger: Send + Sync {
    fn name(&self) -> &str;

    async fn observe(&self, exchange: &Exchange) -> Result<(), HookError>;
}
