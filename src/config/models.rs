//! Configuration data structures for Conduit.
//!
//! These types map directly to YAML (also TOML / JSON) configuration files. They are
//! serde‑friendly and carry defaults so that a minimal config only lists services.
//! The ordered `services` list is the route table: registration order decides which
//! service wins when prefixes overlap.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8001".to_string()
}

fn default_burst() -> u32 {
    10
}

fn default_pool_idle_timeout() -> String {
    "90s".to_string()
}

fn default_pool_max_idle_per_host() -> usize {
    32
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Top level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub rate_limiting: RateLimitSettings,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            forwarding: ForwardingConfig::default(),
            rate_limiting: RateLimitSettings::default(),
            services: Vec::new(),
        }
    }
}

/// One backend service fronted by the gateway under a path prefix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceConfig {
    pub name: String,
    pub prefix: String,
    pub hosts: Vec<String>,
    /// Port the backend listens on. Only validated, the hosts carry the real address.
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Requests per second; absent or `<= 0` means unlimited.
    #[serde(default)]
    pub rate_limit: Option<f64>,
    /// Bucket capacity override for this service.
    #[serde(default)]
    pub burst: Option<u32>,
}

impl ServiceConfig {
    /// Convenience constructor used by tests and embedders.
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            hosts,
            port: 80,
            api_key: None,
            rate_limit: None,
            burst: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: f64) -> Self {
        self.rate_limit = Some(requests_per_second);
        self
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }
}

/// Outbound (backend) connection settings shared by every forwarder.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Upper bound for one backend call, e.g. "30s". No deadline when absent.
    pub request_timeout: Option<String>,
    /// How long an idle pooled connection is kept, e.g. "90s".
    pub pool_idle_timeout: String,
    pub pool_max_idle_per_host: usize,
    /// Largest inbound request body that will be buffered and forwarded.
    pub max_body_bytes: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            pool_idle_timeout: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ForwardingConfig {
    /// Parsed request timeout. Invalid strings are rejected by validation first.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
            .as_deref()
            .and_then(|raw| humantime::parse_duration(raw).ok())
    }

    /// Parsed idle timeout for pooled connections.
    pub fn pool_idle_timeout(&self) -> Option<Duration> {
        humantime::parse_duration(&self.pool_idle_timeout).ok()
    }
}

/// Gateway-wide token bucket settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Bucket capacity used for every rate limited service without its own `burst`.
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            burst: default_burst(),
        }
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    forwarding: Option<ForwardingConfig>,
    rate_limiting: Option<RateLimitSettings>,
    services: Vec<ServiceConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Register a service; order of calls is the routing order.
    pub fn service(mut self, service: ServiceConfig) -> Self {
        self.services.push(service);
        self
    }

    pub fn forwarding(mut self, config: ForwardingConfig) -> Self {
        self.forwarding = Some(config);
        self
    }

    /// Set the gateway-wide burst allowance
    pub fn burst(mut self, burst: u32) -> Self {
        self.rate_limiting = Some(RateLimitSettings { burst });
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.services.is_empty() {
            return Err("At least one service must be configured".to_string());
        }

        Ok(GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            forwarding: self.forwarding.unwrap_or_default(),
            rate_limiting: self.rate_limiting.unwrap_or_default(),
            services: self.services,
        })
    }
}
