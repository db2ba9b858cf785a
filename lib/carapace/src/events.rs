//! Lifecycle events for HTTP exchanges.
//!
//! The event middleware publishes a [`HttpEvent::BeforeSend`] before the
//! request goes down the stack and exactly one of [`HttpEvent::Succeeded`] or
//! [`HttpEvent::Failed`] after it returns. Subscribers observe exchanges,
//! they cannot alter them: a subscriber error is logged and the remaining
//! subscribers still run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use derive_more::{Display, Error};
use tracing::warn;

use crate::{Error as HttpError, Method, Request, Response};

/// Timing and identity of one HTTP exchange.
///
/// Carries the request as the caller issued it, so subscribers see it even
/// when decorators further down rewrite the outgoing copy.
#[derive(Debug, Clone)]
pub struct HttpState {
    request: Request<Bytes>,
    started_at: Instant,
    finished_at: Option<Instant>,
}

impl HttpState {
    /// Capture the state of an outgoing request, starting the clock.
    #[must_use]
    pub fn new(request: &Request<Bytes>) -> Self {
        Self {
            request: request.clone(),
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    /// The request as the caller issued it.
    #[must_use]
    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    /// Mark the exchange finished. The first call wins, later calls are
    /// no-ops.
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
        }
    }

    /// Whether [`finish`](Self::finish) has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.request.method()
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        self.request.url()
    }

    /// Elapsed time, up to now for an unfinished exchange.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }
}

/// One lifecycle notification.
#[derive(Debug)]
pub enum HttpEvent<'a> {
    /// The request is about to be sent.
    BeforeSend {
        /// Exchange state, not yet finished.
        state: &'a HttpState,
    },
    /// The exchange produced a response.
    Succeeded {
        /// Exchange state, finished.
        state: &'a HttpState,
        /// The response, any status code.
        response: &'a Response<Bytes>,
    },
    /// The exchange failed before producing a response.
    Failed {
        /// Exchange state, finished.
        state: &'a HttpState,
        /// The failure being propagated to the caller.
        error: &'a HttpError,
    },
}

impl HttpEvent<'_> {
    /// Event name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeSend { .. } => "before_send",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    /// Exchange state carried by this event.
    #[must_use]
    pub fn state(&self) -> &HttpState {
        match self {
            Self::BeforeSend { state }
            | Self::Succeeded { state, .. }
            | Self::Failed { state, .. } => state,
        }
    }
}

/// Error from a subscriber. Logged by the bus, never propagated.
#[derive(Debug, Display, Error)]
#[display("subscriber error: {message}")]
pub struct SubscriberError {
    message: String,
}

impl SubscriberError {
    /// Create a subscriber error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Observer of HTTP lifecycle events.
pub trait EventSubscriber: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// An error is logged by the bus and does not affect the exchange or
    /// other subscribers.
    fn on_event(&self, event: &HttpEvent<'_>) -> Result<(), SubscriberError>;
}

/// Fan-out to registered subscribers, in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver an event to every subscriber. Subscriber errors are logged
    /// and do not stop delivery.
    pub fn publish(&self, event: &HttpEvent<'_>) {
        for subscriber in &self.subscribers {
            if let Err(error) = subscriber.on_event(event) {
                warn!(event = event.name(), %error, "event subscriber failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert2::{check, let_assert};

    use super::*;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn names(&self) -> Vec<String> {
            self.seen.lock().expect("lock").clone()
        }
    }

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &HttpEvent<'_>) -> Result<(), SubscriberError> {
            self.seen.lock().expect("lock").push(event.name().to_string());
            Ok(())
        }
    }

    struct Failing;

    impl EventSubscriber for Failing {
        fn on_event(&self, _event: &HttpEvent<'_>) -> Result<(), SubscriberError> {
            Err(SubscriberError::new("boom"))
        }
    }

    fn sample_state() -> HttpState {
        let url: url::Url = "https://api.example.com/users".parse().expect("url");
        let request = Request::builder(Method::Get, url).build();
        HttpState::new(&request)
    }

    #[test]
    fn finish_is_idempotent() {
        let mut state = sample_state();
        check!(!state.is_finished());

        state.finish();
        let first = state.elapsed();
        check!(state.is_finished());

        std::thread::sleep(Duration::from_millis(5));
        state.finish();
        check!(state.elapsed() == first);
    }

    #[test]
    fn bus_delivers_in_registration_order() {
        let first = Recorder::new();
        let second = Recorder::new();

        let mut bus = EventBus::new();
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        let state = sample_state();
        bus.publish(&HttpEvent::BeforeSend { state: &state });
        bus.publish(&HttpEvent::Failed {
            state: &state,
            error: &HttpError::Timeout,
        });

        check!(first.names() == vec!["before_send", "failed"]);
        check!(second.names() == vec!["before_send", "failed"]);
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let recorder = Recorder::new();

        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Failing));
        bus.subscribe(recorder.clone());

        let state = sample_state();
        bus.publish(&HttpEvent::BeforeSend { state: &state });

        check!(recorder.names() == vec!["before_send"]);
    }

    #[test]
    fn event_exposes_state() {
        let state = sample_state();
        let event = HttpEvent::BeforeSend { state: &state };

        let_assert!(HttpEvent::BeforeSend { .. } = &event);
        check!(event.state().method() == Method::Get);
        check!(event.state().url().as_str() == "https://api.example.com/users");
    }
}
