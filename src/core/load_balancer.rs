use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::core::{
    backend::BackendUrl,
    service::{RouteTable, ServiceDescriptor},
};

/// Trait defining the interface for load balancing strategies
pub trait LoadBalancingStrategy: Send + Sync + 'static {
    /// Select a target from a list of targets
    fn select_target<'a>(&self, targets: &'a [BackendUrl]) -> Option<&'a BackendUrl>;
    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn LoadBalancingStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin load balancing strategy.
///
/// The cursor always stays in `0..targets.len()`: read and advance happen in one
/// atomic read-modify-write, so concurrent callers receive consecutive turns.
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn select_target<'a>(&self, targets: &'a [BackendUrl]) -> Option<&'a BackendUrl> {
        let len = targets.len();
        if len == 0 {
            return None;
        }
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some((cursor + 1) % len)
            })
            .unwrap_or_else(|cursor| cursor);
        // A cursor can only exceed `len` if the same strategy is reused for a shorter list.
        targets.get(previous % len)
    }
}

/// Per-service rotation state, built once from the route table.
pub struct LoadBalancer {
    strategies: HashMap<String, Box<dyn LoadBalancingStrategy>>,
}

impl LoadBalancer {
    pub fn from_table(table: &RouteTable) -> Self {
        let strategies = table
            .services()
            .iter()
            .map(|service| (service.name.clone(), RoundRobinStrategy::new().boxed()))
            .collect();
        Self { strategies }
    }

    /// Next host for `service`; `None` only for an unknown service.
    pub fn select<'a>(&self, service: &'a ServiceDescriptor) -> Option<&'a BackendUrl> {
        self.strategies
            .get(&service.name)
            .and_then(|strategy| strategy.select_target(&service.hosts))
    }
}
