//! Test utilities for proxy module testing
//!
//! Recording hooks, in-memory sinks and clients, and helpers for running
//! throwaway upstream servers.

#[cfg(test)]
pub mod test_helpers {
    use crate::proxy::client::ClientResponse;
    use crate::proxy::exchange::Exchange;
    use crate::proxy::hooks::{Director, HookError, Logger, Sink, Writer, WriterOutcome};
    use crate::proxy::types::ExchangeId;
    use async_trait::async_trait;
    use axum::body::Body;
    use bytes::Bytes;
    use http::{HeaderMap, Method, Response, StatusCode};
    use parking_lot::Mutex;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Shared, ordered record of hook and client calls
    #[derive(Clone, Default)]
    pub struct CallLog(Arc<Mutex<Vec<String>>>);

    impl CallLog {
        pub fn push(&self, entry: impl Into<String>) {
            self.0.lock().push(entry.into());
        }

        pub fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }

        pub fn count(&self, entry: &str) -> usize {
            self.0.lock().iter().filter(|e| *e == entry).count()
        }
    }

    pub type SharedBytes = Arc<Mutex<Vec<u8>>>;

    /// Exchange for `target` whose upstream answered 200 text/plain with `body`
    pub fn exchange_for(target: &str, body: &'static str) -> Exchange {
        exchange_with_body(target, Body::from(body))
    }

    pub fn exchange_with_body(target: &str, body: Body) -> Exchange {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .expect("static response parts are valid");
        Exchange::new(
            ExchangeId::generate(),
            Method::GET,
            target.parse().expect("test targets are valid URIs"),
            "127.0.0.1:40000".parse().expect("static address is valid"),
            response,
        )
    }

    /// Director that records its name and optionally fails
    pub struct RecordingDirector {
        name: String,
        log: CallLog,
        fail: bool,
    }

    impl RecordingDirector {
        pub fn new(name: &str, log: CallLog) -> Self {
            Self {
                name: name.to_string(),
                log,
                fail: false,
            }
        }

        pub fn failing(name: &str, log: CallLog) -> Self {
            Self {
                fail: true,
                ..Self::new(name, log)
            }
        }
    }

    #[async_trait]
    impl Director for RecordingDirector {
        fn name(&self) -> &str {
            &self.name
        }

        async fn direct(&self, _exchange: &mut Exchange) -> Result<(), HookError> {
            self.log.push(self.name.clone());
            if self.fail {
                return Err(HookError::failed(&self.name, "scripted director failure"));
            }
            Ok(())
        }
    }

    enum WriterMode {
        Skip,
        Fail,
        Stream(SharedBytes),
        FailAfter(usize),
    }

    /// Writer that records its name and hands out a scripted outcome
    pub struct RecordingWriter {
        name: String,
        log: CallLog,
        mode: WriterMode,
    }

    impl RecordingWriter {
        pub fn skipping(name: &str, log: CallLog) -> Self {
            Self {
                name: name.to_string(),
                log,
                mode: WriterMode::Skip,
            }
        }

        pub fn failing(name: &str, log: CallLog) -> Self {
            Self {
                mode: WriterMode::Fail,
                ..Self::skipping(name, log)
            }
        }

        /// Writer streaming into memory; returns the bytes it will receive
        pub fn streaming(name: &str, log: CallLog) -> (Self, SharedBytes) {
            let bytes = SharedBytes::default();
            let writer = Self {
                mode: WriterMode::Stream(bytes.clone()),
                ..Self::skipping(name, log)
            };
            (writer, bytes)
        }

        /// Writer whose sink fails once more than `limit` bytes were written
        pub fn failing_after(name: &str, limit: usize, log: CallLog) -> Self {
            Self {
                mode: WriterMode::FailAfter(limit),
                ..Self::skipping(name, log)
            }
        }
    }

    #[async_trait]
    impl Writer for RecordingWriter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn open(&self, _exchange: &Exchange) -> Result<WriterOutcome, HookError> {
            self.log.push(self.name.clone());
            match &self.mode {
                WriterMode::Skip => Ok(WriterOutcome::Skipped),
                WriterMode::Fail => Err(HookError::failed(&self.name, "scripted open failure")),
                WriterMode::Stream(bytes) => Ok(WriterOutcome::Stream(Box::new(MemorySink {
                    name: self.name.clone(),
                    log: self.log.clone(),
                    bytes: bytes.clone(),
                }))),
                WriterMode::FailAfter(limit) => Ok(WriterOutcome::Stream(Box::new(
                    FailingSink::after(*limit, &self.name, self.log.clone()),
                ))),
            }
        }
    }

    /// Logger that records its name and optionally fails
    pub struct RecordingLogger {
        name: String,
        log: CallLog,
        fail: bool,
    }

    impl RecordingLogger {
        pub fn new(name: &str, log: CallLog) -> Self {
            Self {
                name: name.to_string(),
                log,
                fail: false,
            }
        }

        pub fn failing(name: &str, log: CallLog) -> Self {
            Self {
                fail: true,
                ..Self::new(name, log)
            }
        }
    }

    #[async_trait]
    impl Logger for RecordingLogger {
        fn name(&self) -> &str {
            &self.name
        }

        async fn observe(&self, _exchange: &Exchange) -> Result<(), HookError> {
            self.log.push(self.name.clone());
            if self.fail {
                return Err(HookError::failed(&self.name, "scripted logger failure"));
            }
            Ok(())
        }
    }

    /// Sink collecting bytes in memory; records `close:<name>`
    pub struct MemorySink {
        name: String,
        log: CallLog,
        bytes: SharedBytes,
    }

    impl MemorySink {
        pub fn new(name: &str, log: CallLog) -> (Self, SharedBytes) {
            let bytes = SharedBytes::default();
            let sink = Self {
                name: name.to_string(),
                log,
                bytes: bytes.clone(),
            };
            (sink, bytes)
        }
    }

    #[async_trait]
    impl Sink for MemorySink {
        async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
            self.bytes.lock().extend_from_slice(chunk);
            Ok(())
        }

        async fn close(self: Box<Self>) -> io::Result<()> {
            self.log.push(format!("close:{}", self.name));
            Ok(())
        }
    }

    /// Sink that accepts `limit` bytes and then fails every write
    pub struct FailingSink {
        name: String,
        log: CallLog,
        remaining: usize,
    }

    impl FailingSink {
        pub fn after(limit: usize, name: &str, log: CallLog) -> Self {
            Self {
                name: name.to_string(),
                log,
                remaining: limit,
            }
        }
    }

    #[async_trait]
    impl Sink for FailingSink {
        async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
            if chunk.len() > self.remaining {
                self.remaining = 0;
                return Err(io::Error::other("sink is full"));
            }
            self.remaining -= chunk.len();
            Ok(())
        }

        async fn close(self: Box<Self>) -> io::Result<()> {
            self.log.push(format!("close:{}", self.name));
            Ok(())
        }
    }

    /// Client that records the committed head and every body chunk
    pub struct RecordingClient {
        log: CallLog,
        connected: bool,
        status: Option<StatusCode>,
        headers: HeaderMap,
        body: Vec<u8>,
        aborted: bool,
    }

    impl RecordingClient {
        pub fn new(log: CallLog) -> Self {
            Self {
                log,
                connected: true,
                status: None,
                headers: HeaderMap::new(),
                body: Vec::new(),
                aborted: false,
            }
        }

        /// Client whose connection is already gone
        pub fn disconnected(log: CallLog) -> Self {
            Self {
                connected: false,
                ..Self::new(log)
            }
        }

        pub fn status(&self) -> Option<StatusCode> {
            self.status
        }

        pub fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        pub fn body(&self) -> &[u8] {
            &self.body
        }

        pub fn aborted(&self) -> bool {
            self.aborted
        }

        fn check_connected(&self) -> io::Result<()> {
            if self.connected {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
            }
        }
    }

    #[async_trait]
    impl ClientResponse for RecordingClient {
        async fn commit(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()> {
            self.check_connected()?;
            self.log.push("commit");
            self.status = Some(status);
            self.headers = headers.clone();
            Ok(())
        }

        async fn write(&mut self, chunk: &Bytes) -> io::Result<()> {
            self.check_connected()?;
            self.log.push("write");
            self.body.extend_from_slice(chunk);
            Ok(())
        }

        async fn abort(&mut self, _reason: &str) {
            self.log.push("abort");
            self.aborted = true;
        }
    }

    /// Serve `router` on an ephemeral localhost port
    pub async fn spawn_upstream(router: axum::Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral upstream port");
        let addr = listener.local_addr().expect("listener has an address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    /// An address nothing is listening on
    pub async fn unreachable_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener has an address");
        drop(listener);
        addr
    }
}
