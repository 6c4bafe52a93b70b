use async_trait::async_trait;
use axum::{body::Body, response::IntoResponse};
use http::{Request, Response};

use crate::{
    core::{context::RequestContext, error::GatewayError, pipeline::Endpoint},
    metrics,
};

/// Endpoint for paths no service claims. Never contacts a backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFound;

#[async_trait]
impl Endpoint for NotFound {
    async fn call(&self, ctx: &mut RequestContext, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().to_string();
        tracing::warn!(
            request_id = %ctx.request_id_str(),
            client = %ctx.client_label(),
            method = %req.method(),
            path = %path,
            "Service not found"
        );
        let error = GatewayError::NoRouteMatched { path };
        metrics::increment_rejections(ctx.service_name(), error.kind());
        error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn test_names_the_path() {
        let req = Request::builder()
            .uri("/unknown/thing?q=1")
            .body(Body::empty())
            .unwrap();
        let response = NotFound.call(&mut RequestContext::new(None, None), req).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Service not found for path '/unknown/thing'\n");
    }
}
