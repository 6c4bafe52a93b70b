//! Terminal stage of a service pipeline: relays the request to one backend host.
use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{body::Body, response::IntoResponse};
use http::{HeaderName, HeaderValue, Request, Response, header};
use http_body_util::{BodyExt, Limited};

use crate::{
    core::{
        context::RequestContext, error::GatewayError, load_balancer::LoadBalancer,
        pipeline::Endpoint, service::ServiceDescriptor,
    },
    metrics::{self, BACKEND_FAILURE_STATUS, BackendRequestTimer},
    ports::http_client::HttpClient,
};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

pub struct Forwarder {
    service: Arc<ServiceDescriptor>,
    balancer: Arc<LoadBalancer>,
    client: Arc<dyn HttpClient>,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(
        service: Arc<ServiceDescriptor>,
        balancer: Arc<LoadBalancer>,
        client: Arc<dyn HttpClient>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            service,
            balancer,
            client,
            max_body_bytes,
        }
    }

    fn reject(&self, error: GatewayError) -> Response<Body> {
        metrics::increment_rejections(&self.service.name, error.kind());
        error.into_response()
    }

    fn unavailable(&self) -> Response<Body> {
        self.reject(GatewayError::BackendUnavailable {
            service: self.service.name.clone(),
        })
    }
}

/// `x-forwarded-for` value: the caller's IP without port.
fn forwarded_for(client_addr: Option<SocketAddr>) -> Option<HeaderValue> {
    client_addr.and_then(|addr| HeaderValue::from_str(&addr.ip().to_string()).ok())
}

#[async_trait]
impl Endpoint for Forwarder {
    async fn call(&self, ctx: &mut RequestContext, req: Request<Body>) -> Response<Body> {
        let (mut parts, body) = req.into_parts();

        // Buffer the whole body before any backend is chosen or contacted.
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::error!(
                    service = %self.service.name,
                    request_id = %ctx.request_id_str(),
                    limit = self.max_body_bytes,
                    "Failed to read request body: {}",
                    e
                );
                return self.reject(GatewayError::MalformedRequest {
                    service: self.service.name.clone(),
                });
            }
        };

        let Some(backend) = self.balancer.select(&self.service) else {
            tracing::error!(
                service = %self.service.name,
                request_id = %ctx.request_id_str(),
                "No backend host available"
            );
            return self.unavailable();
        };
        ctx.backend = Some(backend.clone());

        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_string();
        let target = backend.target_uri(&path_and_query);
        parts.uri = match target.parse() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(
                    service = %self.service.name,
                    backend = %backend,
                    request_id = %ctx.request_id_str(),
                    "Invalid backend URI {}: {}",
                    target,
                    e
                );
                return self.unavailable();
            }
        };

        parts.headers.remove(header::TRANSFER_ENCODING);
        match forwarded_for(ctx.client_addr) {
            Some(value) => {
                parts.headers.insert(X_FORWARDED_FOR, value);
            }
            None => {
                parts.headers.remove(X_FORWARDED_FOR);
            }
        }

        let method = parts.method.clone();
        let outgoing = Request::from_parts(parts, Body::from(body));

        let timer = BackendRequestTimer::new(&self.service.name, backend.as_str());
        match self.client.send_request(outgoing).await {
            Ok(response) => {
                let status = response.status();
                tracing::info!(
                    service = %self.service.name,
                    backend = %backend,
                    request_id = %ctx.request_id_str(),
                    status = status.as_u16(),
                    latency = ?timer.elapsed(),
                    "Forwarded {} {}",
                    method,
                    path_and_query
                );
                metrics::increment_backend_request_total(
                    &self.service.name,
                    backend.as_str(),
                    status.as_u16(),
                );

                let (mut parts, body) = response.into_parts();
                parts.headers.remove(header::TRANSFER_ENCODING);
                Response::from_parts(parts, body)
            }
            Err(e) => {
                tracing::error!(
                    service = %self.service.name,
                    backend = %backend,
                    request_id = %ctx.request_id_str(),
                    latency = ?timer.elapsed(),
                    "{} service is unavailable: {}",
                    self.service.name,
                    e
                );
                metrics::increment_backend_request_total(
                    &self.service.name,
                    backend.as_str(),
                    BACKEND_FAILURE_STATUS,
                );
                self.unavailable()
            }
        }
    }
}
