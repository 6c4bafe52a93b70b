//! Request correlation.
//!
//! The first stage of every pipeline. It mints a UUID per request, records it
//! in the [`RequestContext`], forwards it to the backend in `x-request-id`,
//! echoes it on the response whatever the outcome, and runs the rest of the
//! chain inside a `request` span so every log line carries the same id.
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderName, HeaderValue, Request, Response};
use tracing::Instrument;

use crate::{
    core::{
        context::{RequestContext, RequestId},
        pipeline::{Next, Stage},
    },
    metrics, tracing_setup,
};

/// Header carrying the correlation id, in both directions.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Default, Clone, Copy)]
pub struct Correlator;

impl Correlator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for Correlator {
    fn name(&self) -> &'static str {
        "correlator"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        mut req: Request<Body>,
        next: Next<'_>,
    ) -> Response<Body> {
        let request_id = RequestId::generate();
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        // A UUID is always a valid header value.
        let header_value = HeaderValue::from_str(request_id.as_str()).ok();
        if let Some(value) = &header_value {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        }
        ctx.request_id = Some(request_id.clone());

        let span = tracing_setup::create_request_span(
            method.as_str(),
            &path,
            request_id.as_str(),
            ctx.service_name(),
            &ctx.client_label(),
        );
        let service = ctx.service_name().to_string();

        let mut response = next.run(ctx, req).instrument(span.clone()).await;

        if let Some(value) = header_value {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        let elapsed = start.elapsed();
        let status = response.status().as_u16();
        span.record("http.status_code", status);
        span.record(
            "duration_ms",
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        );
        span.in_scope(|| {
            tracing::info!(status, ?elapsed, "Completed {} {}", method, path);
        });
        metrics::increment_request_total(&service, method.as_str(), status);
        metrics::record_request_duration(&service, method.as_str(), elapsed);

        response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::StatusCode;

    use super::*;
    use crate::core::pipeline::{Endpoint, Pipeline};

    /// Captures what the rest of the chain saw.
    #[derive(Default)]
    struct Probe {
        seen: Mutex<Option<(String, String)>>,
    }

    #[async_trait]
    impl Endpoint for Probe {
        async fn call(&self, ctx: &mut RequestContext, req: Request<Body>) -> Response<Body> {
            let header = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            *self.seen.lock().unwrap() = Some((ctx.request_id_str().to_string(), header));
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            response
        }
    }

    #[tokio::test]
    async fn test_id_reaches_context_request_and_response() {
        let probe = Arc::new(Probe::default());
        let pipeline = Pipeline::new(probe.clone()).stage(Arc::new(Correlator::new()));

        let req = Request::builder()
            .uri("/orders/1")
            .header(REQUEST_ID_HEADER, "client-chosen")
            .body(Body::empty())
            .unwrap();
        let mut ctx = RequestContext::new(None, None);
        let response = pipeline.run(&mut ctx, req).await;

        let (ctx_id, header_id) = probe.seen.lock().unwrap().clone().unwrap();
        let response_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(header_id, "client-chosen");
        assert_eq!(ctx_id, header_id);
        assert_eq!(ctx_id, response_id);
        assert!(uuid::Uuid::parse_str(&response_id).is_ok());
    }

    #[tokio::test]
    async fn test_each_request_gets_new_id() {
        let pipeline =
            Pipeline::new(Arc::new(Probe::default())).stage(Arc::new(Correlator::new()));

        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut ctx = RequestContext::new(None, None);
            let req = Request::builder().uri("/").body(Body::empty()).unwrap();
            let response = pipeline.run(&mut ctx, req).await;
            ids.push(response.headers()[REQUEST_ID_HEADER].clone());
        }
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }
}
