//! The route table: validated, immutable service descriptors in registration order.
use std::sync::Arc;

use crate::{
    config::{GatewayConfig, ServiceConfig},
    core::backend::{BackendResult, BackendUrl},
};

/// A backend service fronted by the gateway under one path prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub prefix: String,
    pub hosts: Vec<BackendUrl>,
    pub api_key: Option<String>,
    pub rate_limit: Option<f64>,
    pub burst: Option<u32>,
}

impl ServiceDescriptor {
    /// Build a descriptor from an already validated service entry.
    pub fn from_config(config: &ServiceConfig) -> BackendResult<Self> {
        let hosts = config
            .hosts
            .iter()
            .map(|host| BackendUrl::new(host))
            .collect::<BackendResult<Vec<_>>>()?;

        Ok(Self {
            name: config.name.clone(),
            prefix: config.prefix.clone(),
            hosts,
            api_key: config.api_key.clone(),
            rate_limit: config.rate_limit,
            burst: config.burst,
        })
    }

    /// The key a caller must present, `None` when the service is open.
    pub fn required_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Positive requests-per-second limit, `None` when unlimited.
    pub fn rate_limit_per_second(&self) -> Option<f64> {
        self.rate_limit.filter(|rate| *rate > 0.0)
    }

    /// Segment-aware prefix match: `/orders` matches `/orders` and `/orders/1`
    /// but not `/ordersx`. A root prefix matches every path.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Ordered, read-only list of services. Shared without locking.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    services: Vec<Arc<ServiceDescriptor>>,
}

impl RouteTable {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services: services.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> BackendResult<Self> {
        let services = config
            .services
            .iter()
            .map(ServiceDescriptor::from_config)
            .collect::<BackendResult<Vec<_>>>()?;
        Ok(Self::new(services))
    }

    pub fn services(&self) -> &[Arc<ServiceDescriptor>] {
        &self.services
    }

    /// Index of the first service, in registration order, whose prefix matches `path`.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.services.iter().position(|service| service.matches(path))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, prefix: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            prefix: prefix.to_string(),
            hosts: vec![BackendUrl::new("http://h1:9000").unwrap()],
            api_key: None,
            rate_limit: None,
            burst: None,
        }
    }

    #[test]
    fn test_prefix_matching_respects_segments() {
        let orders = descriptor("orders", "/orders");
        assert!(orders.matches("/orders"));
        assert!(orders.matches("/orders/1"));
        assert!(orders.matches("/orders/"));
        assert!(!orders.matches("/ordersx"));
        assert!(!orders.matches("/order"));
        assert!(!orders.matches("/"));
    }

    #[test]
    fn test_root_prefix_matches_everything() {
        let root = descriptor("root", "/");
        assert!(root.matches("/"));
        assert!(root.matches("/anything/at/all"));
    }

    #[test]
    fn test_trailing_slash_prefix() {
        let api = descriptor("api", "/api/");
        assert!(api.matches("/api"));
        assert!(api.matches("/api/users"));
        assert!(!api.matches("/apix"));
    }

    #[test]
    fn test_first_registered_wins() {
        let table = RouteTable::new(vec![
            descriptor("broad", "/api"),
            descriptor("narrow", "/api/users"),
        ]);
        assert_eq!(table.position("/api/users/7"), Some(0));
        assert_eq!(table.position("/api/users"), Some(0));
        assert_eq!(table.position("/other"), None);
    }

    #[test]
    fn test_optional_fields() {
        let mut service = descriptor("orders", "/orders");
        assert_eq!(service.required_api_key(), None);
        service.api_key = Some(String::new());
        assert_eq!(service.required_api_key(), None);
        service.api_key = Some("k".to_string());
        assert_eq!(service.required_api_key(), Some("k"));

        assert_eq!(service.rate_limit_per_second(), None);
        service.rate_limit = Some(0.0);
        assert_eq!(service.rate_limit_per_second(), None);
        service.rate_limit = Some(-1.0);
        assert_eq!(service.rate_limit_per_second(), None);
        service.rate_limit = Some(2.5);
        assert_eq!(service.rate_limit_per_second(), Some(2.5));
    }

    #[test]
    fn test_from_config_rejects_bad_host() {
        let config = ServiceConfig::new("x", "/x", vec!["x:1".to_string()]);
        assert!(ServiceDescriptor::from_config(&config).is_err());
    }
}
