//! Single-pass body fan-out to the client and every open sink
//!
//! A failing destination is reported and skipped for the rest of the copy;
//! it never stops delivery to the client or to the other sinks.

use crate::proxy::client::ClientResponse;
use crate::proxy::hooks::Sink;
use bytes::Bytes;
use std::fmt;
use tracing::warn;

/// Which branch of the tee failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Client,
    Sink { writer: String },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Sink { writer } => write!(f, "sink of {writer}"),
        }
    }
}

/// A write failure on one branch of the tee
#[derive(Clone, Debug)]
pub struct DestinationFailure {
    pub destination: Destination,
    pub error: String,
}

/// A sink opened by a writer for the current exchange
pub struct OpenSink {
    writer: String,
    sink: Box<dyn Sink>,
    healthy: bool,
}

impl OpenSink {
    pub fn new(writer: impl Into<String>, sink: Box<dyn Sink>) -> Self {
        Self {
            writer: writer.into(),
            sink,
            healthy: true,
        }
    }

    pub fn writer(&self) -> &str {
        &self.writer
    }

    pub fn into_parts(self) -> (String, Box<dyn Sink>) {
        (self.writer, self.sink)
    }
}

/// Tee over the client and all open sinks that tolerates branch failures
pub struct FanOut<'a> {
    client: &'a mut dyn ClientResponse,
    client_healthy: bool,
    sinks: &'a mut [OpenSink],
    failures: Vec<DestinationFailure>,
}

impl<'a> FanOut<'a> {
    pub fn new(
        client: &'a mut dyn ClientResponse,
        client_healthy: bool,
        sinks: &'a mut [OpenSink],
    ) -> Self {
        Self {
            client,
            client_healthy,
            sinks,
            failures: Vec::new(),
        }
    }

    /// Write one chunk to every destination that has not failed yet
    pub async fn write(&mut self, chunk: &Bytes) {
        if self.client_healthy {
            if let Err(error) = self.client.write(chunk).await {
                warn!(%error, "client write failed, continuing with sinks");
                self.client_healthy = false;
                self.failures.push(DestinationFailure {
                    destination: Destination::Client,
                    error: error.to_string(),
                });
            }
        }

        for open in self.sinks.iter_mut().filter(|open| open.healthy) {
            if let Err(error) = open.sink.write(chunk).await {
                warn!(writer = %open.writer, %error, "sink write failed, continuing");
                open.healthy = false;
                self.failures.push(DestinationFailure {
                    destination: Destination::Sink {
                        writer: open.writer.clone(),
                    },
                    error: error.to_string(),
                });
            }
        }
    }

    /// Tell a still-connected client that the body ended abnormally
    pub async fn abort_client(&mut self, reason: &str) {
        if self.client_healthy {
            self.client.abort(reason).await;
            self.client_healthy = false;
        }
    }

    pub fn into_failures(self) -> Vec<DestinationFailure> {
        self.failures
    }
}
