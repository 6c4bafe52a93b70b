//! Explicit middleware chain.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s terminated by one
//! [`Endpoint`]. Pipelines are composed once per service at startup; a request
//! walks the chain through [`Next`], and any stage may answer on its own
//! instead of calling further.
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};

use crate::core::context::RequestContext;

/// One middleware step of a pipeline.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Short name used in startup logs.
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        req: Request<Body>,
        next: Next<'_>,
    ) -> Response<Body>;
}

/// Terminal handler of a pipeline.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn call(&self, ctx: &mut RequestContext, req: Request<Body>) -> Response<Body>;
}

/// The remainder of a pipeline, as seen from inside a stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    endpoint: &'a dyn Endpoint,
}

impl Next<'_> {
    /// Hand the request to the following stage, or to the endpoint.
    pub async fn run(self, ctx: &mut RequestContext, req: Request<Body>) -> Response<Body> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    endpoint: self.endpoint,
                };
                stage.handle(ctx, req, next).await
            }
            None => self.endpoint.call(ctx, req).await,
        }
    }
}

/// A fixed, composed chain of stages plus endpoint.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Pipeline {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            stages: Vec::new(),
            endpoint,
        }
    }

    /// Append a stage; stages run in the order they are added.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub async fn run(&self, ctx: &mut RequestContext, req: Request<Body>) -> Response<Body> {
        Next {
            stages: &self.stages,
            endpoint: self.endpoint.as_ref(),
        }
        .run(ctx, req)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
        short_circuit: bool,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(
            &self,
            ctx: &mut RequestContext,
            req: Request<Body>,
            next: Next<'_>,
        ) -> Response<Body> {
            self.journal.lock().unwrap().push(self.name);
            if self.short_circuit {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::FORBIDDEN;
                return response;
            }
            next.run(ctx, req).await
        }
    }

    struct Terminal {
        journal: Journal,
    }

    #[async_trait]
    impl Endpoint for Terminal {
        async fn call(&self, _ctx: &mut RequestContext, _req: Request<Body>) -> Response<Body> {
            self.journal.lock().unwrap().push("endpoint");
            Response::new(Body::empty())
        }
    }

    fn recorder(name: &'static str, journal: &Journal, short_circuit: bool) -> Arc<dyn Stage> {
        Arc::new(Recorder {
            name,
            journal: journal.clone(),
            short_circuit,
        })
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let journal: Journal = Arc::default();
        let pipeline = Pipeline::new(Arc::new(Terminal {
            journal: journal.clone(),
        }))
        .stage(recorder("first", &journal, false))
        .stage(recorder("second", &journal, false));

        assert_eq!(pipeline.stage_names(), ["first", "second"]);

        let mut ctx = RequestContext::new(None, None);
        let response = pipeline.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*journal.lock().unwrap(), ["first", "second", "endpoint"]);
    }

    #[tokio::test]
    async fn test_stage_can_terminate_chain() {
        let journal: Journal = Arc::default();
        let pipeline = Pipeline::new(Arc::new(Terminal {
            journal: journal.clone(),
        }))
        .stage(recorder("gate", &journal, true))
        .stage(recorder("after", &journal, false));

        let mut ctx = RequestContext::new(None, None);
        let response = pipeline.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*journal.lock().unwrap(), ["gate"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_endpoint() {
        let journal: Journal = Arc::default();
        let pipeline = Pipeline::new(Arc::new(Terminal {
            journal: journal.clone(),
        }));

        let mut ctx = RequestContext::new(None, None);
        pipeline.run(&mut ctx, request()).await;
        assert_eq!(*journal.lock().unwrap(), ["endpoint"]);
    }
}
