use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioTimer},
};
use rustls_native_certs::load_native_certs;
use tokio::time::Instant;
use tower_http::timeout::TimeoutBody;
use tracing::Instrument;

use crate::{
    config::ForwardingConfig,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup,
};

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Keeps one connection pool shared by every service
/// * Rewrites `Host` to the backend authority and forces HTTP/1.1 framing
/// * Bounds each call by the configured request timeout, if any. The budget
///   covers the response head; whatever is left of it bounds every wait for
///   a frame of the relayed body.
/// * Converts between Hyper body and Axum body types
///
/// Retries and fallback hosts are deliberately absent: a failed call is final.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    request_timeout: Option<Duration>,
}

impl HttpClientAdapter {
    /// Create a client with default pool settings and no request timeout.
    pub fn new() -> Result<Self> {
        Self::from_config(&ForwardingConfig::default())
    }

    /// Create a client sized by the forwarding section of the configuration.
    pub fn from_config(config: &ForwardingConfig) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let pool_idle_timeout = config.pool_idle_timeout();
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build::<_, AxumBody>(https_connector);

        let request_timeout = config.request_timeout();
        tracing::info!(
            pool_max_idle_per_host = config.pool_max_idle_per_host,
            pool_idle_timeout = ?pool_idle_timeout,
            request_timeout = ?request_timeout,
            "Created backend HTTP client"
        );
        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// `Host` value for an absolute URI, `None` if the URI has no host.
    fn host_header(uri: &hyper::Uri) -> Option<HeaderValue> {
        let host = uri.host()?;
        let value = match uri.port_u16() {
            Some(port) => HeaderValue::from_str(&format!("{host}:{port}")),
            None => HeaderValue::from_str(host),
        };
        value.ok()
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        let span = tracing_setup::create_backend_span(
            &backend_identifier,
            req.method().as_str(),
            req.uri().path(),
        );

        let Some(host) = Self::host_header(req.uri()) else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        };
        req.headers_mut().insert(header::HOST, host);

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        // The body is re-framed by hyper.
        parts.headers.remove(header::TRANSFER_ENCODING);

        tracing::debug!(parent: &span, "Outgoing request headers: {:?}", parts.headers);

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing_request = Request::from_parts(parts, body);

        let started = Instant::now();
        let call = self.client.request(outgoing_request).instrument(span.clone());
        let result = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    span.record("http.status_code", 599u16);
                    tracing::error!(
                        parent: &span,
                        "Request to backend {} ({} {}) timed out after {:?}",
                        backend_identifier,
                        method,
                        uri,
                        limit
                    );
                    return Err(HttpClientError::Timeout(
                        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    ));
                }
            },
            None => call.await,
        };

        match result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // Remove Transfer-Encoding header since the body is being decoded/streamed
                // and the downstream server (Axum) will handle framing.
                parts.headers.remove(header::TRANSFER_ENCODING);

                let body = match self.request_timeout {
                    // Each wait for a body frame is bounded by what is left of the budget.
                    Some(limit) => {
                        let remaining = limit.saturating_sub(started.elapsed());
                        AxumBody::new(TimeoutBody::new(remaining, hyper_body))
                    }
                    None => AxumBody::new(hyper_body),
                };
                Ok(Response::from_parts(parts, body))
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                tracing::error!(
                    parent: &span,
                    "Error making request to backend {} ({} {}): {}",
                    backend_identifier,
                    method,
                    uri,
                    e
                );

                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )))
            }
        }
    }
}
