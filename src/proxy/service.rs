//! Main proxy service implementation
//!
//! The `ProxyService` accepts inbound requests, performs the upstream round
//! trip and hands each response to the [`ResponseInterceptor`] on its own
//! task.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! use std::net::SocketAddr;
//! use tapwire::proxy::{HookPipeline, ProxyConfig, ProxyService};
//!
//! // 1. Register hooks, then freeze the pipeline
//! let mut builder = HookPipeline::builder();
//! builder.add_logger(my_logger);
//!
//! // 2. Create the service and convert it into a router
//! let router = ProxyService::new(ProxyConfig::default(), builder.build()).into_router();
//!
//! // 3. Serve with Axum, keeping peer addresses for client paths
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:9999").await?;
//! axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! ```

use crate::proxy::client::client_channel;
use crate::proxy::error_response::ErrorResponseExt;
use crate::proxy::exchange::Exchange;
use crate::proxy::interceptor::ResponseInterceptor;
use crate::proxy::pipeline::HookPipeline;
use crate::proxy::types::*;
use crate::proxy::url_resolver::build_outbound_request;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    response::Response,
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::error::Error as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument};

/// Transparent interception proxy
#[derive(Clone)]
pub struct ProxyService {
    config: Arc<ProxyConfig>,
    interceptor: Arc<ResponseInterceptor>,
    client: Client<HttpConnector, Body>,
}

impl ProxyService {
    /// Create a proxy whose hooks are fixed for its whole lifetime
    pub fn new(config: ProxyConfig, pipeline: HookPipeline) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build_http();

        info!(?pipeline, "hook pipeline registered");

        Self {
            config: Arc::new(config),
            interceptor: Arc::new(ResponseInterceptor::new(Arc::new(pipeline))),
            client,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Create an Axum router that sends every request through the proxy
    pub fn into_router(self) -> axum::Router {
        axum::Router::new()
            .fallback(proxy_handler)
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }

    /// Proxy one request. Upstream failures end only this exchange.
    #[instrument(skip(self, request), fields(method = %request.method(), uri = %request.uri()))]
    pub async fn handle(
        &self,
        request: Request,
        remote_addr: SocketAddr,
        exchange_id: ExchangeId,
    ) -> ProxyResult<Response> {
        let method = request.method().clone();
        let outbound = build_outbound_request(request)?;
        let target = outbound.uri().clone();
        debug!(%target, "forwarding upstream");

        let response = self.round_trip(outbound).await?;

        let exchange = Exchange::new(
            exchange_id,
            method,
            target,
            remote_addr,
            response.map(Body::new),
        );
        let (mut client, pending) = client_channel(*self.config.client_buffer_chunks.as_ref());
        let interceptor = Arc::clone(&self.interceptor);
        tokio::spawn(async move {
            let report = interceptor.intercept(exchange, &mut client).await;
            debug!(?report, "exchange finished");
        });

        pending.into_response().await
    }

    async fn round_trip(
        &self,
        request: Request,
    ) -> ProxyResult<Response<hyper::body::Incoming>> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(timeout))?
            .map_err(|e| ProxyError::Upstream(describe_transport_error(&e)))
    }
}

/// Flatten a transport error and its sources into one line
fn describe_transport_error(error: &hyper_util::client::legacy::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Axum handler for proxying requests
async fn proxy_handler(
    State(proxy): State<Arc<ProxyService>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let exchange_id = ExchangeId::generate();
    match proxy.handle(request, remote_addr, exchange_id).await {
        Ok(response) => response,
        Err(err) => {
            error!(%exchange_id, error = %err, "exchange failed");
            let status = err.status_code();
            err.to_error_response()
                .with_request_id(exchange_id.to_string())
                .into_response_with_status(status)
        }
    }
}
