//! Orchestrates one exchange through the hook pipeline
//!
//! ```text
//! Received -> DirectorsApplied -> HeadersCommitted -> SinksOpened
//!          -> BodyCopied -> LoggersApplied -> Closed
//! ```
//!
//! Every transition is taken even when the step before it failed. The head
//! commit cannot be undone, so directors run strictly before it and nothing
//! after it touches status or headers. Every sink a writer opened is closed
//! exactly once, whether the body was copied, truncated or absent.

use crate::proxy::client::ClientResponse;
use crate::proxy::exchange::Exchange;
use crate::proxy::fan_out::{Destination, DestinationFailure, FanOut};
use crate::proxy::headers::{copy_headers, strip_hop_by_hop};
use crate::proxy::hooks::HookError;
use crate::proxy::pipeline::HookPipeline;
use crate::proxy::types::ExchangeId;
use axum::body::Body;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tracing::{instrument, trace, warn};

/// Position of an exchange in the interception state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExchangeState {
    Received,
    DirectorsApplied,
    HeadersCommitted,
    SinksOpened,
    BodyCopied,
    LoggersApplied,
    Closed,
}

/// What happened to one exchange
#[derive(Debug)]
pub struct InterceptReport {
    pub exchange_id: ExchangeId,
    pub state: ExchangeState,
    /// Status sent to the client, after directors ran
    pub status: StatusCode,
    pub committed: bool,
    pub bytes_copied: u64,
    pub sinks_opened: usize,
    pub sinks_closed: usize,
    pub hook_failures: Vec<String>,
    pub destination_failures: Vec<DestinationFailure>,
    /// Upstream body read error that truncated the copy
    pub body_error: Option<String>,
}

impl InterceptReport {
    fn new(exchange_id: ExchangeId, status: StatusCode) -> Self {
        Self {
            exchange_id,
            state: ExchangeState::Received,
            status,
            committed: false,
            bytes_copied: 0,
            sinks_opened: 0,
            sinks_closed: 0,
            hook_failures: Vec::new(),
            destination_failures: Vec::new(),
            body_error: None,
        }
    }

    fn advance(&mut self, next: ExchangeState) {
        trace!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }

    fn record_hook_failures(&mut self, failures: Vec<HookError>) {
        self.hook_failures
            .extend(failures.into_iter().map(|failure| failure.to_string()));
    }
}

/// Runs the director / writer / logger stages around a single exchange
#[derive(Clone, Debug)]
pub struct ResponseInterceptor {
    pipeline: Arc<HookPipeline>,
}

impl ResponseInterceptor {
    pub fn new(pipeline: Arc<HookPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &HookPipeline {
        &self.pipeline
    }

    #[instrument(
        name = "intercept",
        skip_all,
        fields(exchange_id = %exchange.id(), method = %exchange.method(), uri = %exchange.target())
    )]
    pub async fn intercept(
        &self,
        mut exchange: Exchange,
        client: &mut dyn ClientResponse,
    ) -> InterceptReport {
        let mut report = InterceptReport::new(exchange.id(), exchange.status());

        let failures = self.pipeline.run_directors(&mut exchange).await;
        report.record_hook_failures(failures);
        exchange.reframe_replaced_body();
        report.advance(ExchangeState::DirectorsApplied);

        let mut headers = HeaderMap::new();
        copy_headers(&mut headers, exchange.headers());
        strip_hop_by_hop(&mut headers);
        report.status = exchange.status();
        let client_healthy = match client.commit(exchange.status(), &headers).await {
            Ok(()) => {
                report.committed = true;
                true
            }
            Err(error) => {
                warn!(%error, "could not commit response head to client");
                report.destination_failures.push(DestinationFailure {
                    destination: Destination::Client,
                    error: error.to_string(),
                });
                false
            }
        };
        report.advance(ExchangeState::HeadersCommitted);

        let (mut sinks, failures) = self.pipeline.open_sinks(&exchange).await;
        report.sinks_opened = sinks.len();
        report.record_hook_failures(failures);
        report.advance(ExchangeState::SinksOpened);

        let body = exchange.body_for_copy();
        let mut fan_out = FanOut::new(client, client_healthy, &mut sinks);
        let (bytes_copied, body_error) = copy_body(body, &mut fan_out).await;
        if let Some(error) = &body_error {
            warn!(%error, bytes_copied, "upstream body ended abnormally");
            fan_out.abort_client(error).await;
        }
        report.destination_failures.extend(fan_out.into_failures());
        report.bytes_copied = bytes_copied;
        report.body_error = body_error;
        exchange.record_copied(bytes_copied);
        report.advance(ExchangeState::BodyCopied);

        let failures = self.pipeline.run_loggers(&exchange).await;
        report.record_hook_failures(failures);
        report.advance(ExchangeState::LoggersApplied);

        for open in sinks {
            let (writer, sink) = open.into_parts();
            if let Err(error) = sink.close().await {
                warn!(%writer, %error, "sink close failed");
                report.destination_failures.push(DestinationFailure {
                    destination: Destination::Sink { writer },
                    error: error.to_string(),
                });
            }
            report.sinks_closed += 1;
        }
        report.advance(ExchangeState::Closed);

        report
    }
}

/// One read pass over the body, fanned out chunk by chunk.
async fn copy_body(body: Option<Body>, fan_out: &mut FanOut<'_>) -> (u64, Option<String>) {
    let Some(mut body) = body else {
        return (0, None);
    };

    let mut copied = 0u64;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                if data.is_empty() {
                    continue;
                }
                copied += data.len() as u64;
                fan_out.write(&data).await;
            }
            Err(error) => return (copied, Some(error.to_string())),
        }
    }
    (copied, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::hooks::Director;
    use crate::proxy::pipeline::PipelineBuilder;
    use crate::proxy::test_utils::test_helpers::{
        exchange_for, exchange_with_body, CallLog, RecordingClient, RecordingDirector,
        RecordingLogger, RecordingWriter,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::HeaderValue;

    fn interceptor(configure: impl FnOnce(&mut PipelineBuilder)) -> ResponseInterceptor {
        let mut builder = HookPipeline::builder();
        configure(&mut builder);
        ResponseInterceptor::new(Arc::new(builder.build()))
    }

    /// Collapse runs of identical entries so a multi-chunk copy reads as one step
    fn collapsed(entries: Vec<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in entries {
            if out.last() != Some(&entry) {
                out.push(entry);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_stage_order_is_fixed() {
        let log = CallLog::default();
        let interceptor = interceptor(|b| {
            b.add_director(RecordingDirector::new("D1", log.clone()))
                .add_director(RecordingDirector::new("D2", log.clone()))
                .add_writer(RecordingWriter::skipping("W1", log.clone()))
                .add_writer(RecordingWriter::skipping("W2", log.clone()))
                .add_logger(RecordingLogger::new("L1", log.clone()));
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", "hello"), &mut client)
            .await;

        assert_eq!(
            collapsed(log.entries()),
            vec!["D1", "D2", "commit", "W1", "W2", "write", "L1"]
        );
        assert_eq!(report.state, ExchangeState::Closed);
        assert_eq!(client.body(), b"hello");
    }

    #[tokio::test]
    async fn test_one_sink_closed_when_one_writer_opts_out() {
        let log = CallLog::default();
        let (w1, archived) = RecordingWriter::streaming("W1", log.clone());
        let interceptor = interceptor(|b| {
            b.add_writer(w1)
                .add_writer(RecordingWriter::skipping("W2", log.clone()));
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", "full body"), &mut client)
            .await;

        assert_eq!(report.sinks_opened, 1);
        assert_eq!(report.sinks_closed, 1);
        assert_eq!(log.count("close:W1"), 1);
        assert_eq!(&archived.lock()[..], b"full body");
        assert_eq!(client.body(), b"full body");
    }

    #[tokio::test]
    async fn test_client_gets_full_body_when_sink_fails_mid_write() {
        let log = CallLog::default();
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"first-")),
            Ok(Bytes::from_static(b"second-")),
            Ok(Bytes::from_static(b"third")),
        ];
        let interceptor = interceptor(|b| {
            b.add_writer(RecordingWriter::failing_after("W1", 8, log.clone()))
                .add_writer(RecordingWriter::skipping("W2", log.clone()));
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(
                exchange_with_body(
                    "http://example.com/",
                    Body::from_stream(futures_util::stream::iter(chunks)),
                ),
                &mut client,
            )
            .await;

        assert_eq!(client.body(), b"first-second-third");
        assert_eq!(report.sinks_closed, 1);
        assert_eq!(log.count("close:W1"), 1);
        assert_eq!(report.destination_failures.len(), 1);
    }

    #[tokio::test]
    async fn test_absent_body_still_opens_and_closes_sinks_and_runs_loggers() {
        let log = CallLog::default();
        let (w1, archived) = RecordingWriter::streaming("W1", log.clone());
        let interceptor = interceptor(|b| {
            b.add_director(BodyRemover)
                .add_writer(w1)
                .add_logger(RecordingLogger::new("L1", log.clone()));
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", "dropped"), &mut client)
            .await;

        assert_eq!(report.bytes_copied, 0);
        assert_eq!(report.sinks_closed, 1);
        assert!(archived.lock().is_empty());
        assert_eq!(collapsed(log.entries()), vec!["commit", "W1", "L1", "close:W1"]);
    }

    #[tokio::test]
    async fn test_zero_length_body_closes_sinks() {
        let log = CallLog::default();
        let (w1, _archived) = RecordingWriter::streaming("W1", log.clone());
        let interceptor = interceptor(|b| {
            b.add_writer(w1);
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", ""), &mut client)
            .await;

        assert_eq!(report.bytes_copied, 0);
        assert_eq!(log.count("close:W1"), 1);
        assert!(!log.entries().contains(&"write".to_string()));
    }

    #[tokio::test]
    async fn test_failing_director_does_not_prevent_logger() {
        let log = CallLog::default();
        let interceptor = interceptor(|b| {
            b.add_director(RecordingDirector::failing("D1", log.clone()))
                .add_logger(RecordingLogger::new("L1", log.clone()));
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", "ok"), &mut client)
            .await;

        assert!(log.entries().contains(&"L1".to_string()));
        assert_eq!(report.hook_failures.len(), 1);
        assert_eq!(client.body(), b"ok");
    }

    #[tokio::test]
    async fn test_director_changes_are_what_the_client_sees() {
        let log = CallLog::default();
        let interceptor = interceptor(|b| {
            b.add_director(Rewriter);
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", "original"), &mut client)
            .await;

        assert_eq!(client.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(client.headers().get("x-rewritten").unwrap(), "yes");
        assert_eq!(client.body(), b"rewritten");
        assert_eq!(client.headers().get(http::header::CONTENT_LENGTH).unwrap(), "9");
        assert_eq!(report.status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_hop_by_hop_headers_are_not_committed() {
        let log = CallLog::default();
        let interceptor = interceptor(|_| {});
        let mut exchange = exchange_for("http://example.com/", "x");
        exchange
            .headers_mut()
            .insert(http::header::CONNECTION, HeaderValue::from_static("close"));
        let mut client = RecordingClient::new(log.clone());

        interceptor.intercept(exchange, &mut client).await;

        assert!(client.headers().get(http::header::CONNECTION).is_none());
        assert_eq!(
            client.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn test_upstream_body_error_aborts_client_and_closes_sinks() {
        let log = CallLog::default();
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let (w1, archived) = RecordingWriter::streaming("W1", log.clone());
        let interceptor = interceptor(|b| {
            b.add_writer(w1)
                .add_logger(RecordingLogger::new("L1", log.clone()));
        });
        let mut client = RecordingClient::new(log.clone());

        let report = interceptor
            .intercept(
                exchange_with_body(
                    "http://example.com/",
                    Body::from_stream(futures_util::stream::iter(chunks)),
                ),
                &mut client,
            )
            .await;

        assert!(report.body_error.is_some());
        assert!(client.aborted());
        assert_eq!(&archived.lock()[..], b"partial");
        assert_eq!(log.count("close:W1"), 1);
        assert!(log.entries().contains(&"L1".to_string()));
    }

    #[tokio::test]
    async fn test_disconnected_client_still_archives() {
        let log = CallLog::default();
        let (w1, archived) = RecordingWriter::streaming("W1", log.clone());
        let interceptor = interceptor(|b| {
            b.add_writer(w1);
        });
        let mut client = RecordingClient::disconnected(log.clone());

        let report = interceptor
            .intercept(exchange_for("http://example.com/", "kept"), &mut client)
            .await;

        assert!(!report.committed);
        assert_eq!(&archived.lock()[..], b"kept");
        assert_eq!(report.sinks_closed, 1);
    }

    struct BodyRemover;

    #[async_trait]
    impl Director for BodyRemover {
        fn name(&self) -> &str {
            "body-remover"
        }

        async fn direct(&self, exchange: &mut Exchange) -> Result<(), HookError> {
            exchange.take_body();
            Ok(())
        }
    }

    struct Rewriter;

    #[async_trait]
    impl Director for Rewriter {
        fn name(&self) -> &str {
            "rewriter"
        }

        async fn direct(&self, exchange: &mut Exchange) -> Result<(), HookError> {
            exchange.set_status(StatusCode::ACCEPTED);
            exchange
                .headers_mut()
                .insert("x-rewritten", HeaderValue::from_static("yes"));
            exchange.set_body(Body::from("rewritten"));
            Ok(())
        }
    }
}
