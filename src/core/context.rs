use std::{fmt, net::SocketAddr, sync::Arc};

use uuid::Uuid;

use crate::core::{backend::BackendUrl, service::ServiceDescriptor};

/// Per-request correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ephemeral state of one inbound request, threaded through every stage.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Set by the correlator, empty before it runs.
    pub request_id: Option<RequestId>,
    /// `None` for requests handled by the catch-all.
    pub service: Option<Arc<ServiceDescriptor>>,
    pub client_addr: Option<SocketAddr>,
    /// Chosen once by the forwarder.
    pub backend: Option<BackendUrl>,
}

impl RequestContext {
    pub fn new(service: Option<Arc<ServiceDescriptor>>, client_addr: Option<SocketAddr>) -> Self {
        Self {
            request_id: None,
            service,
            client_addr,
            backend: None,
        }
    }

    pub fn service_name(&self) -> &str {
        self.service
            .as_deref()
            .map_or("gateway", |service| service.name.as_str())
    }

    pub fn request_id_str(&self) -> &str {
        self.request_id.as_ref().map_or("-", RequestId::as_str)
    }

    pub fn client_label(&self) -> String {
        self.client_addr
            .map_or_else(|| "unknown".to_string(), |addr| addr.to_string())
    }
}
