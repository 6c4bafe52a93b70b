use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request},
    response::Response,
};
use tower_http::trace::TraceLayer;

use crate::core::GatewayService;

/// HTTP front door: hands every inbound request to the gateway dispatcher.
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>) -> Self {
        Self { gateway_service }
    }

    /// Dispatch one request. The caller address comes from axum's
    /// `ConnectInfo` extension when the server was built with it.
    pub async fn handle_request(&self, req: Request) -> Response<Body> {
        let client_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        self.gateway_service.dispatch(req, client_addr).await
    }

    /// Router sending every method and path to [`HttpHandler::handle_request`].
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(move |req: Request| {
                let handler = self.clone();
                async move { handler.handle_request(req).await }
            })
            .layer(TraceLayer::new_for_http())
    }
}

impl Clone for HttpHandler {
    fn clone(&self) -> Self {
        Self {
            gateway_service: self.gateway_service.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::{GatewayConfig, ServiceConfig},
        core::correlator::REQUEST_ID_HEADER,
        ports::http_client::{HttpClient, HttpClientResult},
    };

    /// Answers with the `x-forwarded-for` header it received.
    struct ForwardedForEcho;

    #[async_trait]
    impl HttpClient for ForwardedForEcho {
        async fn send_request(&self, req: Request) -> HttpClientResult<Response<Body>> {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            Ok(Response::new(Body::from(forwarded)))
        }
    }

    fn router() -> Router {
        let config = GatewayConfig::builder()
            .service(ServiceConfig::new(
                "orders",
                "/orders",
                vec!["http://h1:9000".to_string()],
            ))
            .build()
            .unwrap();
        let gateway = GatewayService::new(&config, Arc::new(ForwardedForEcho)).unwrap();
        Arc::new(HttpHandler::new(Arc::new(gateway))).router()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_any_method_and_path_reaches_gateway() {
        for (method, path, status) in [
            ("GET", "/orders", StatusCode::OK),
            ("DELETE", "/orders/1", StatusCode::OK),
            ("PATCH", "/nothing/here", StatusCode::NOT_FOUND),
        ] {
            let req = http::Request::builder()
                .method(method)
                .uri(path)
                .body(Body::empty())
                .unwrap();
            let response = router().oneshot(req).await.unwrap();
            assert_eq!(response.status(), status, "{method} {path}");
            assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connect_info_becomes_forwarded_for() {
        let addr: SocketAddr = "192.168.1.20:41000".parse().unwrap();
        let mut req = http::Request::builder()
            .uri("/orders")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        let response = router().oneshot(req).await.unwrap();
        assert_eq!(body_text(response).await, "192.168.1.20");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_connect_info_sends_no_forwarded_for() {
        let req = http::Request::builder()
            .uri("/orders")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(req).await.unwrap();
        assert_eq!(body_text(response).await, "none");
    }
}
