use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, response::IntoResponse};
use http::{HeaderName, Request, Response};

use crate::{
    core::{
        context::RequestContext,
        error::GatewayError,
        pipeline::{Next, Stage},
        service::ServiceDescriptor,
    },
    metrics,
};

/// Header carrying the caller's credential.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Per-service API key check. Open services (no key configured) admit everything.
pub struct ApiKeyGate {
    service: Arc<ServiceDescriptor>,
}

impl ApiKeyGate {
    pub fn new(service: Arc<ServiceDescriptor>) -> Self {
        Self { service }
    }

    /// Pure admit predicate.
    pub fn is_authorized<T>(&self, req: &Request<T>) -> bool {
        match self.service.required_api_key() {
            None => true,
            Some(expected) => req
                .headers()
                .get(API_KEY_HEADER)
                .is_some_and(|presented| presented.as_bytes() == expected.as_bytes()),
        }
    }
}

#[async_trait]
impl Stage for ApiKeyGate {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        req: Request<Body>,
        next: Next<'_>,
    ) -> Response<Body> {
        if self.is_authorized(&req) {
            return next.run(ctx, req).await;
        }

        tracing::error!(
            service = %self.service.name,
            request_id = %ctx.request_id_str(),
            client = %ctx.client_label(),
            method = %req.method(),
            path = %req.uri().path(),
            "Unauthorized"
        );
        let error = GatewayError::AuthenticationFailure {
            service: self.service.name.clone(),
        };
        metrics::increment_rejections(&self.service.name, error.kind());
        error.into_response()
    }
}
