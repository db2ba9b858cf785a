//! Lifecycle event middleware.
//!
//! Publishes a before-send event, runs the rest of the stack, then publishes
//! exactly one of succeeded or failed. Placed outermost so its events frame
//! everything the pipeline does, including cache hits and retries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::config::{EventSettings, HostScoped};
use crate::events::{EventBus, HttpEvent, HttpState};
use crate::{Error, Request, Response, Result};

/// Layer that publishes lifecycle events around each exchange.
#[derive(Debug, Clone)]
pub struct EventLayer {
    settings: Arc<HostScoped<EventSettings>>,
    bus: Arc<EventBus>,
}

impl EventLayer {
    /// Create an event layer from host-scoped settings and a bus.
    #[must_use]
    pub fn new(settings: HostScoped<EventSettings>, bus: Arc<EventBus>) -> Self {
        Self {
            settings: Arc::new(settings),
            bus,
        }
    }
}

impl<S> Layer<S> for EventLayer {
    type Service = Event<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Event {
            inner,
            settings: Arc::clone(&self.settings),
            bus: Arc::clone(&self.bus),
        }
    }
}

/// Service that publishes lifecycle events around each exchange.
#[derive(Debug, Clone)]
pub struct Event<S> {
    inner: S,
    settings: Arc<HostScoped<EventSettings>>,
    bus: Arc<EventBus>,
}

impl<S> Service<Request<Bytes>> for Event<S>
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
        let bus = Arc::clone(&self.bus);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !enabled || bus.is_empty() {
                return inner.call(request).await;
            }

            let mut state = HttpState::new(&request);
            bus.publish(&HttpEvent::BeforeSend { state: &state });

            match inner.call(request).await {
                Ok(response) => {
                    state.finish();
                    bus.publish(&HttpEvent::Succeeded {
                        state: &state,
                        response: &response,
                    });
                    Ok(response)
                }
                Err(error) => {
                    state.finish();
                    bus.publish(&HttpEvent::Failed {
                        state: &state,
                        error: &error,
                    });
                    Err(error)
                }
            }
        })
    }
}
