//! Artificial latency middleware.
//!
//! Pauses before each send, useful for surfacing race conditions and
//! loading-state bugs during development.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::trace;

use crate::config::{DelaySettings, HostScoped};
use crate::{Error, Request, Response, Result};

/// Layer that pauses before each send.
#[derive(Debug, Clone)]
pub struct DelayLayer {
    settings: Arc<HostScoped<DelaySettings>>,
}

impl DelayLayer {
    /// Create a delay layer from host-scoped settings.
    #[must_use]
    pub fn new(settings: HostScoped<DelaySettings>) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl<S> Layer<S> for DelayLayer {
    type Service = Delay<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Delay {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Service that pauses before each send.
#[derive(Debug, Clone)]
pub struct Delay<S> {
    inner: S,
    settings: Arc<HostScoped<DelaySettings>>,
}

impl<S> Service<Request<Bytes>> for Delay<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let settings = self.settings.for_host(request.host()).clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if settings.enabled && settings.delay_ms > 0 {
                trace!(delay_ms = settings.delay_ms, "delaying request");
                tokio::time::sleep(settings.delay()).await;
            }
            inner.call(request).await
        })
    }
}
