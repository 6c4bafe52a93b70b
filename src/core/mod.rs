pub mod auth;
pub mod backend;
pub mod catch_all;
pub mod context;
pub mod correlator;
pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod load_balancer;
pub mod pipeline;
pub mod rate_limiter;
pub mod service;

pub use error::GatewayError;
pub use gateway::GatewayService;
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy, RoundRobinStrategy};
pub use rate_limiter::{RateLimiterRegistry, ServiceRateLimiter};
pub use service::{RouteTable, ServiceDescriptor};
