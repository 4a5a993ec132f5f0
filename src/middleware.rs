//! Request middleware chain
//!
//! Each layer either answers a request or hands it back untouched so the
//! next layer can try. The static fallback terminates the chain.

use crate::body::MediaBody;
use crate::static_files::StaticFiles;
use async_trait::async_trait;
use http::{Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Result of offering a request to a middleware layer
pub enum Dispatch<B> {
    /// The layer produced the response
    Handled(Response<MediaBody>),
    /// The layer declined; the request is returned unconsumed
    Pass(Request<B>),
}

impl<B> Dispatch<B> {
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }
}

/// A layer in the dev server's request pipeline
#[async_trait]
pub trait Middleware<B: Send + 'static>: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Answer the request or pass it back
    async fn call(&self, req: Request<B>) -> Dispatch<B>;
}

/// Ordered layers followed by the static fallback
pub struct MiddlewareChain<B: Send + 'static> {
    layers: Vec<Arc<dyn Middleware<B>>>,
    fallback: StaticFiles,
}

impl<B: Send + 'static> MiddlewareChain<B> {
    pub fn new(fallback: StaticFiles) -> Self {
        MiddlewareChain {
            layers: Vec::new(),
            fallback,
        }
    }

    /// Append a layer; layers run in insertion order
    pub fn with_layer(mut self, layer: Arc<dyn Middleware<B>>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Run the request through every layer until one handles it
    pub async fn dispatch(&self, mut req: Request<B>) -> Response<MediaBody> {
        for layer in &self.layers {
            match layer.call(req).await {
                Dispatch::Handled(response) => {
                    debug!("{} handled request: status={}", layer.name(), response.status());
                    return response;
                }
                Dispatch::Pass(passed) => req = passed,
            }
        }
        let uri = req.uri().clone();
        drop(req);
        self.fallback.serve(&uri).await
    }
}
