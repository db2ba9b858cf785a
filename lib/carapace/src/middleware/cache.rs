//! Response cache middleware.
//!
//! On a hit the inner stack is never called. On a miss the response goes
//! down to the wire and, when its status qualifies, is stored with the
//! host's time-to-live. Backend failures degrade to cache-off behavior: a
//! failing `get` is a miss, a failing `set` loses the entry, and the
//! response is returned either way.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheKey, KeyOptions, StoredResponse};
use crate::config::{CacheSettings, HostScoped};
use crate::{Error, Request, Response, Result};

/// Layer that serves repeat requests from a cache backend.
#[derive(Clone)]
pub struct CacheLayer {
    settings: Arc<HostScoped<CacheSettings>>,
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CacheLayer {
    /// Create a cache layer from host-scoped settings and a backend.
    #[must_use]
    pub fn new(settings: HostScoped<CacheSettings>, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            settings: Arc::new(settings),
            backend,
        }
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = Cache<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cache {
            inner,
            settings: Arc::clone(&self.settings),
            backend: Arc::clone(&self.backend),
        }
    }
}

/// Service that serves repeat requests from a cache backend.
#[derive(Clone)]
pub struct Cache<S> {
    inner: S,
    settings: Arc<HostScoped<CacheSettings>>,
    backend: Arc<dyn CacheBackend>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Cache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("inner", &self.inner)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request<Bytes>> for Cache<S>
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
        let backend = Arc::clone(&self.backend);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !settings.enabled {
                return inner.call(request).await;
            }

            let key = CacheKey::derive(&request, &KeyOptions::from(&settings));

            match backend.get(key.digest()).await {
                Ok(Some(bytes)) => match StoredResponse::from_bytes(&bytes) {
                    Ok(stored) => {
                        debug!(key = key.digest(), "cache hit");
                        return Ok(stored.into_response());
                    }
                    Err(error) => {
                        warn!(key = key.digest(), %error, "evicting undecodable cache entry");
                        if let Err(error) = backend.delete(key.digest()).await {
                            warn!(key = key.digest(), %error, "cache delete failed");
                        }
                    }
                },
                Ok(None) => {}
                Err(error) => {
                    warn!(key = key.digest(), %error, "cache read failed, treating as miss");
                }
            }

            let response = inner.call(request).await?;

            if settings.is_cacheable(response.status()) {
                match StoredResponse::from_response(&response).to_bytes() {
                    Ok(bytes) => {
                        if let Err(error) =
                            backend.set(key.digest(), bytes, Some(settings.ttl())).await
                        {
                            warn!(key = key.digest(), %error, "cache write failed");
                        }
                    }
                    Err(error) => {
                        warn!(key = key.digest(), %error, "cache encoding failed");
                    }
                }
            }

            Ok(response)
        })
    }
}
