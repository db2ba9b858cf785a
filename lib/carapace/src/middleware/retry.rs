//! Retry middleware with configurable backoff.
//!
//! Resends a request when the response status or the error qualifies, up to
//! `max_retries` additional attempts. Non-idempotent methods are never
//! retried unless the host's settings opt in, and the final outcome is
//! always the last attempt's outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::debug;

use crate::config::{HostScoped, RetrySettings};
use crate::{Error, Request, Response, Result};

/// Layer that resends failed requests.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    settings: Arc<HostScoped<RetrySettings>>,
}

impl RetryLayer {
    /// Create a retry layer from host-scoped settings.
    #[must_use]
    pub fn new(settings: HostScoped<RetrySettings>) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Service that resends failed requests.
#[derive(Debug, Clone)]
pub struct Retry<S> {
    inner: S,
    settings: Arc<HostScoped<RetrySettings>>,
}

fn outcome_qualifies(settings: &RetrySettings, outcome: &Result<Response<Bytes>>) -> bool {
    match outcome {
        Ok(response) => settings.should_retry_status(response.status()),
        Err(error) => settings.should_retry_error(error),
    }
}

impl<S> Service<Request<Bytes>> for Retry<S>
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
            let retryable_method =
                request.method().is_idempotent() || settings.retry_non_idempotent;
            let max_retries = if settings.enabled && retryable_method {
                settings.max_retries
            } else {
                0
            };

            let mut outcome = inner.call(request.clone()).await;

            let mut attempt = 0;
            while attempt < max_retries && outcome_qualifies(&settings, &outcome) {
                attempt += 1;
                let wait = settings.backoff.delay(attempt);
                debug!(
                    attempt,
                    max_retries,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "retrying request"
                );
                tokio::time::sleep(wait).await;
                outcome = inner.call(request.clone()).await;
            }

            outcome
        })
    }
}
