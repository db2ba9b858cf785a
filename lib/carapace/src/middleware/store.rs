//! Disk snapshot middleware.
//!
//! Persists each exchange through an [`ArtifactWriter`]: the outgoing
//! request before the send, then the response or the failure text after.
//! Strictly best-effort: persistence failures are logged and the HTTP
//! outcome comes back untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::warn;

use crate::cache::{CacheKey, KeyOptions};
use crate::config::{HostScoped, StoreSettings};
use crate::persist::ArtifactWriter;
use crate::{Error, Request, Response, Result};

/// Layer that persists exchanges to disk.
#[derive(Clone)]
pub struct StoreLayer {
    settings: Arc<HostScoped<StoreSettings>>,
    writer: Arc<ArtifactWriter>,
}

impl std::fmt::Debug for StoreLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLayer")
            .field("settings", &self.settings)
            .field("writer", &self.writer)
            .finish()
    }
}

impl StoreLayer {
    /// Create a store layer from host-scoped settings and a writer.
    #[must_use]
    pub fn new(settings: HostScoped<StoreSettings>, writer: Arc<ArtifactWriter>) -> Self {
        Self {
            settings: Arc::new(settings),
            writer,
        }
    }
}

impl<S> Layer<S> for StoreLayer {
    type Service = Store<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Store {
            inner,
            settings: Arc::clone(&self.settings),
            writer: Arc::clone(&self.writer),
        }
    }
}

/// Service that persists exchanges to disk.
#[derive(Clone)]
pub struct Store<S> {
    inner: S,
    settings: Arc<HostScoped<StoreSettings>>,
    writer: Arc<ArtifactWriter>,
}

impl<S> Service<Request<Bytes>> for Store<S>
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
        let enabled = self.settings.for_host(request.host()).enabled;
        let writer = Arc::clone(&self.writer);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !enabled {
                return inner.call(request).await;
            }

            let key = CacheKey::derive(&request, &KeyOptions::default());
            if let Err(error) = writer.save_request(&key, &request).await {
                warn!(key = key.digest(), %error, "request snapshot failed");
            }

            let outcome = inner.call(request).await;

            match &outcome {
                Ok(response) => {
                    if let Err(error) = writer.save_response(&key, response).await {
                        warn!(key = key.digest(), %error, "response snapshot failed");
                    }
                }
                Err(error) => {
                    if let Err(persist_error) = writer.save_error(&key, error).await {
                        warn!(key = key.digest(), %persist_error, "error snapshot failed");
                    }
                }
            }

            outcome
        })
    }
}
