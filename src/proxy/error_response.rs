//! JSON bodies for exchanges that never reached the interceptor
//!
//! A failed exchange answers the client with a JSON body and the exchange id
//! in `x-request-id`, so a client-visible failure can be matched to the
//! server's log lines.

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::ProxyError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body sent to the client when the proxy itself answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable, upper-case code such as `UPSTREAM_TIMEOUT`
    pub code: String,
    pub message: String,
    /// Exchange id, also sent as `x-request-id`
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Render as JSON with `status`, echoing the exchange id as a header
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let id_header = self
            .request_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok());

        let mut response = (status, Json(self)).into_response();
        if let Some(value) = id_header {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        response
    }
}

/// How a per-exchange error is shown to the client
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorResponse;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        match self {
            MissingHost => ErrorResponse::new(
                "MISSING_HOST",
                "Request names no upstream host (no Host header, no absolute target)",
            ),
            InvalidTargetUri(msg) => {
                ErrorResponse::new("INVALID_TARGET", format!("Invalid target: {msg}"))
            }
            UpstreamTimeout(duration) => ErrorResponse::new(
                "UPSTREAM_TIMEOUT",
                format!("Upstream did not respond within {duration:?}"),
            )
            .with_details(serde_json::json!({ "timeout_ms": duration.as_millis() as u64 })),
            Upstream(msg) => ErrorResponse::new("UPSTREAM_ERROR", msg.clone()),
            Internal(msg) => ErrorResponse::new("INTERNAL_ERROR", msg.clone()),
        }
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            MissingHost | InvalidTargetUri(_) => StatusCode::BAD_REQUEST,
            UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Upstream(_) => StatusCode::BAD_GATEWAY,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.to_error_response().into_response_with_status(status)
    }
}
