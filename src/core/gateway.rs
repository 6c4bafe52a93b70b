//! Core gateway orchestration service.
//!
//! The `GatewayService` is the dispatcher. At construction it turns the
//! validated configuration into an immutable route table and composes one
//! pipeline per service:
//!
//! `Correlator -> ApiKeyGate -> RateLimitStage (rate limited services only) -> Forwarder`
//!
//! plus a fallback pipeline (`Correlator -> NotFound`) for paths no service
//! claims. Per request it only looks up the first matching prefix and runs the
//! prepared pipeline; nothing is composed or allocated per service at runtime.
use std::{net::SocketAddr, sync::Arc};

use axum::body::Body;
use eyre::{Result, WrapErr, eyre};
use http::{Request, Response};

use crate::{
    config::GatewayConfig,
    core::{
        auth::ApiKeyGate,
        catch_all::NotFound,
        context::RequestContext,
        correlator::Correlator,
        forwarder::Forwarder,
        load_balancer::LoadBalancer,
        pipeline::{Pipeline, Stage},
        rate_limiter::{RateLimitStage, RateLimiterRegistry},
        service::{RouteTable, ServiceDescriptor},
    },
    ports::http_client::HttpClient,
};

/// A registered service together with its composed handler chain.
struct ServiceRoute {
    descriptor: Arc<ServiceDescriptor>,
    pipeline: Pipeline,
}

/// Central dispatcher. Shared behind an `Arc` by every connection task.
///
/// `routes[i]` serves `table.services()[i]`.
pub struct GatewayService {
    table: RouteTable,
    routes: Vec<ServiceRoute>,
    fallback: Pipeline,
}

impl GatewayService {
    /// Build the route table, limiters and pipelines from a validated configuration.
    ///
    /// All services share `client` and one load balancer.
    pub fn new(config: &GatewayConfig, client: Arc<dyn HttpClient>) -> Result<Self> {
        let table = RouteTable::from_config(config).wrap_err("Failed to build route table")?;
        let rate_limiters = RateLimiterRegistry::from_table(&table, config.rate_limiting.burst)
            .map_err(|e| eyre!("Failed to build rate limiters: {e}"))?;
        let balancer = Arc::new(LoadBalancer::from_table(&table));
        let correlator: Arc<dyn Stage> = Arc::new(Correlator::new());

        let routes = table
            .services()
            .iter()
            .map(|descriptor| {
                let forwarder = Forwarder::new(
                    descriptor.clone(),
                    balancer.clone(),
                    client.clone(),
                    config.forwarding.max_body_bytes,
                );
                let mut pipeline = Pipeline::new(Arc::new(forwarder))
                    .stage(correlator.clone())
                    .stage(Arc::new(ApiKeyGate::new(descriptor.clone())));
                if let Some(limiter) = rate_limiters.get(&descriptor.name) {
                    pipeline = pipeline.stage(Arc::new(RateLimitStage::new(limiter)));
                }

                let hosts: Vec<&str> = descriptor.hosts.iter().map(|h| h.as_str()).collect();
                tracing::info!(
                    service = %descriptor.name,
                    prefix = %descriptor.prefix,
                    hosts = ?hosts,
                    stages = ?pipeline.stage_names(),
                    "Registered service"
                );

                ServiceRoute {
                    descriptor: descriptor.clone(),
                    pipeline,
                }
            })
            .collect();

        let fallback = Pipeline::new(Arc::new(NotFound)).stage(correlator);

        tracing::info!(
            services = table.len(),
            rate_limited = rate_limiters.len(),
            "Gateway routes ready"
        );

        Ok(Self {
            table,
            routes,
            fallback,
        })
    }

    /// Stage names of the pipeline serving `service`.
    pub fn pipeline_stages(&self, service: &str) -> Option<Vec<&'static str>> {
        self.routes
            .iter()
            .find(|route| route.descriptor.name == service)
            .map(|route| route.pipeline.stage_names())
    }

    /// Answer one inbound request. Always produces a response.
    pub async fn dispatch(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Response<Body> {
        let route = self
            .table
            .position(req.uri().path())
            .and_then(|index| self.routes.get(index));

        match route {
            Some(route) => {
                let mut ctx = RequestContext::new(Some(route.descriptor.clone()), client_addr);
                route.pipeline.run(&mut ctx, req).await
            }
            None => {
                let mut ctx = RequestContext::new(None, client_addr);
                self.fallback.run(&mut ctx, req).await
            }
        }
    }
}
