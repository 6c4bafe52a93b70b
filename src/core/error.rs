//! Client-facing failures of the dispatch pipeline.
//!
//! Every variant maps to exactly one status code and renders a fixed message
//! naming only the service or path. Library errors never reach the client; they
//! are logged where they happen.
use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{StatusCode, header};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Unauthorized: missing or invalid API key for service '{service}'")]
    AuthenticationFailure { service: String },

    #[error("Too Many Requests: rate limit exceeded for service '{service}'")]
    RateLimitExceeded { service: String },

    #[error("{service} service is unavailable")]
    BackendUnavailable { service: String },

    #[error("Service not found for path '{path}'")]
    NoRouteMatched { path: String },

    #[error("Malformed request: body could not be read for service '{service}'")]
    MalformedRequest { service: String },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::NoRouteMatched { .. } => StatusCode::NOT_FOUND,
            GatewayError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AuthenticationFailure { .. } => "authentication_failure",
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::BackendUnavailable { .. } => "backend_unavailable",
            GatewayError::NoRouteMatched { .. } => "no_route_matched",
            GatewayError::MalformedRequest { .. } => "malformed_request",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(format!("{self}\n")));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
