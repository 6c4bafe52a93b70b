//! Service‑scoped rate limiting built atop `governor`.
//!
//! Each rate limited service owns one direct (non‑keyed) GCRA limiter: a token
//! bucket whose capacity is the burst allowance and which regains one token
//! every `1 / rate` seconds. The limiter state is a single atomic word updated
//! by compare‑and‑swap, so concurrent checks on one service are linearizable
//! and different services never contend. Limiters are built once from the
//! route table; the registry map is never modified afterwards.
use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{body::Body, response::IntoResponse};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};
use http::{Request, Response};

use crate::{
    core::{
        context::RequestContext,
        error::GatewayError,
        pipeline::{Next, Stage},
        service::RouteTable,
    },
    metrics,
};

pub type DirectRateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Time to regain one token at `requests_per_second`.
///
/// Fails unless the rate is positive and its period fits a non-zero `Duration`.
pub fn refill_period(requests_per_second: f64) -> Result<Duration, String> {
    if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
        return Err(format!("must be a positive number, got {requests_per_second}"));
    }
    match Duration::try_from_secs_f64(1.0 / requests_per_second) {
        Ok(period) if !period.is_zero() => Ok(period),
        Ok(_) => Err(format!("{requests_per_second} requests per second is too high")),
        Err(e) => Err(format!("{requests_per_second} requests per second is too low: {e}")),
    }
}

/// Token bucket of one service.
pub struct ServiceRateLimiter {
    service: String,
    limiter: DirectRateLimiterImpl,
    burst: NonZeroU32,
}

impl ServiceRateLimiter {
    /// Build a limiter admitting `burst` requests at once and refilling at
    /// `requests_per_second`.
    pub fn new(service: &str, requests_per_second: f64, burst: u32) -> Result<Self, String> {
        let period = refill_period(requests_per_second)
            .map_err(|e| format!("Rate limit for '{service}' {e}"))?;
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| format!("Burst for '{service}' must be greater than 0"))?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| format!("Rate limit for '{service}' has a zero period"))?
            .allow_burst(burst);

        tracing::info!(
            service,
            requests_per_second,
            burst = burst.get(),
            "Creating rate limiter"
        );

        Ok(Self {
            service: service.to_string(),
            limiter: RateLimiter::direct(quota),
            burst,
        })
    }

    /// Atomically consume one token.
    pub fn check(&self) -> Result<(), GatewayError> {
        self.limiter
            .check()
            .map_err(|_| GatewayError::RateLimitExceeded {
                service: self.service.clone(),
            })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}

/// All service limiters, keyed by service name.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: HashMap<String, Arc<ServiceRateLimiter>>,
}

impl RateLimiterRegistry {
    /// One limiter per service with a positive rate; others are unlimited.
    pub fn from_table(table: &RouteTable, default_burst: u32) -> Result<Self, String> {
        let mut limiters = HashMap::new();
        for service in table.services() {
            if let Some(rate) = service.rate_limit_per_second() {
                let burst = service.burst.unwrap_or(default_burst);
                let limiter = ServiceRateLimiter::new(&service.name, rate, burst)?;
                limiters.insert(service.name.clone(), Arc::new(limiter));
            }
        }
        Ok(Self { limiters })
    }

    pub fn get(&self, service: &str) -> Option<Arc<ServiceRateLimiter>> {
        self.limiters.get(service).cloned()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

/// Pipeline stage enforcing one service's bucket.
pub struct RateLimitStage {
    limiter: Arc<ServiceRateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<ServiceRateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        req: Request<Body>,
        next: Next<'_>,
    ) -> Response<Body> {
        match self.limiter.check() {
            Ok(()) => next.run(ctx, req).await,
            Err(error) => {
                tracing::warn!(
                    service = %self.limiter.service(),
                    request_id = %ctx.request_id_str(),
                    client = %ctx.client_label(),
                    method = %req.method(),
                    path = %req.uri().path(),
                    "Rate limit exceeded"
                );
                metrics::increment_rejections(self.limiter.service(), error.kind());
                error.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::core::{backend::BackendUrl, service::ServiceDescriptor};

    fn descriptor(name: &str, rate_limit: Option<f64>, burst: Option<u32>) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            prefix: format!("/{name}"),
            hosts: vec![BackendUrl::new("http://h:1").unwrap()],
            api_key: None,
            rate_limit,
            burst,
        }
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(ServiceRateLimiter::new("s", 0.0, 2).is_err());
        assert!(ServiceRateLimiter::new("s", -1.0, 2).is_err());
        assert!(ServiceRateLimiter::new("s", f64::NAN, 2).is_err());
        assert!(ServiceRateLimiter::new("s", 5.0, 0).is_err());
        assert!(ServiceRateLimiter::new("s", 1e12, 2).is_err());
        assert!(ServiceRateLimiter::new("s", 1e-300, 2).is_err());
    }

    #[test]
    fn test_refill_period() {
        assert_eq!(refill_period(2.0), Ok(Duration::from_millis(500)));
        assert_eq!(refill_period(0.5), Ok(Duration::from_secs(2)));
        assert!(refill_period(1e12).unwrap_err().contains("too high"));
        assert!(refill_period(1e-300).unwrap_err().contains("too low"));
        assert!(refill_period(0.0).is_err());
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = ServiceRateLimiter::new("orders", 1.0, 3).unwrap();
        for _ in 0..3 {
            assert!(limiter.check().is_ok());
        }
        assert_eq!(
            limiter.check(),
            Err(GatewayError::RateLimitExceeded {
                service: "orders".to_string()
            })
        );
    }

    #[test]
    fn test_refills_one_token_per_period() {
        // 10 rps: one token every 100ms.
        let limiter = ServiceRateLimiter::new("orders", 10.0, 2).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());

        thread::sleep(Duration::from_millis(120));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_concurrent_checks_admit_exactly_burst() {
        let limiter = Arc::new(ServiceRateLimiter::new("orders", 0.5, 8).unwrap());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.check().is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 8);
    }

    #[test]
    fn test_registry_only_tracks_limited_services() {
        let table = RouteTable::new(vec![
            descriptor("limited", Some(1.0), None),
            descriptor("custom", Some(1.0), Some(1)),
            descriptor("open", None, None),
            descriptor("zero", Some(0.0), None),
        ]);
        let registry = RateLimiterRegistry::from_table(&table, 2).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("limited").unwrap().burst(), 2);
        assert_eq!(registry.get("custom").unwrap().burst(), 1);
        assert!(registry.get("open").is_none());
        assert!(registry.get("zero").is_none());
    }

    #[test]
    fn test_services_have_independent_buckets() {
        let table = RouteTable::new(vec![
            descriptor("a", Some(1.0), Some(1)),
            descriptor("b", Some(1.0), Some(1)),
        ]);
        let registry = RateLimiterRegistry::from_table(&table, 1).unwrap();

        let (a, b) = (registry.get("a").unwrap(), registry.get("b").unwrap());
        assert!(a.check().is_ok());
        assert!(a.check().is_err());
        assert!(b.check().is_ok());
    }
}
