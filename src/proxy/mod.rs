//! Transparent HTTP proxy with a staged response-interception pipeline
//!
//! Every upstream response becomes an [`Exchange`] that moves through three
//! hook stages:
//! - Directors: rewrite the response before the head is committed
//! - Writers: receive a single-pass copy of the body alongside the client
//! - Loggers: observe the finished exchange

pub mod client;
pub mod error_response;
pub mod exchange;
pub mod fan_out;
pub mod headers;
pub mod hooks;
pub mod interceptor;
pub mod pipeline;
pub mod service;
pub mod types;
pub mod url_resolver;

#[cfg(test)]
pub mod test_utils;


pub use exchange::Exchange;
pub use hooks::{Director, HookError, Logger, Sink, Writer, WriterOutcome};
pub use interceptor::{ExchangeState, InterceptReport, ResponseInterceptor};
pub use pipeline::{HookPipeline, PipelineBuilder};
pub use service::ProxyService;
pub use types::{ExchangeId, ProxyConfig, ProxyError, ProxyResult};
