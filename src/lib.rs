//! Conduit - a small prefix-routing API gateway and reverse proxy.
//!
//! Conduit fronts a set of backend services. Each service owns a path prefix,
//! one or more backend hosts, an optional API key and an optional rate limit.
//! For every inbound request the gateway picks the first service whose prefix
//! matches, runs the pipeline composed for it at startup and relays the
//! backend's answer to the caller.
//!
//! # Features
//! - Segment-aware prefix routing, first registered service wins
//! - Round-robin load balancing across a service's hosts
//! - Per-service API key authentication (`x-api-key`)
//! - Per-service token bucket rate limiting (`governor`)
//! - Correlation IDs (`x-request-id`) on every request and response
//! - Structured logging via `tracing`, metrics via the `metrics` facade
//! - YAML / TOML / JSON configuration with startup validation
//! - Graceful shutdown draining in-flight requests
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use conduit::{GatewayService, HttpClientAdapter, HttpHandler};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = conduit::config::load_config("config.yaml").await?;
//! let client = Arc::new(HttpClientAdapter::from_config(&cfg.forwarding)?);
//! let gateway = Arc::new(GatewayService::new(&cfg, client)?);
//! let app = Arc::new(HttpHandler::new(gateway)).router();
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! routing, authentication, rate limiting and forwarding inside `core`. A request flows
//! through an explicit [`core::pipeline::Pipeline`] of stages:
//!
//! `Correlator -> ApiKeyGate -> RateLimitStage -> Forwarder`
//!
//! # Error Handling
//! Startup APIs return `eyre::Result<T>`. Per-request failures are
//! [`core::GatewayError`] values rendered as plain-text responses with a fixed
//! status code each.
//!
//! # Concurrency
//! Route table, pipelines, round-robin cursors and rate buckets are built once and
//! never resized. Per-request shared state is limited to per-service atomics, so
//! there is no global lock on the request path.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
