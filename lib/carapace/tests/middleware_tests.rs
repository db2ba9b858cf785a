//! Decorator ordering tests against a scripted in-memory base service.
//!
//! The assembled stack wraps, outermost first: events, store, response
//! customization, request customization, cache, retry, delay. These tests
//! pin down the interactions that order produces.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use carapace::cache::MemoryBackend;
use carapace::config::PipelineConfig;
use carapace::events::{EventSubscriber, HttpEvent, SubscriberError};
use carapace::tower::util::BoxCloneService;
use carapace::tower::Service;
use carapace::{Error, HttpClient, Method, Pipeline, Request, Response, Result};

/// Base service returning scripted statuses in order, repeating the last.
/// Records every request it receives.
#[derive(Clone)]
struct ScriptedBase {
    statuses: Vec<u16>,
    call_count: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl ScriptedBase {
    fn new(statuses: Vec<u16>) -> Self {
        Self {
            statuses,
            call_count: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Service<Request> for ScriptedBase {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
        self.requests.lock().expect("lock").push(request);
        let status = self
            .statuses
            .get(index)
            .or_else(|| self.statuses.last())
            .copied()
            .unwrap_or(200);
        let mut headers = HashMap::new();
        headers.insert("x-upstream".to_string(), "raw".to_string());
        Box::pin(async move { Ok(Response::new(status, headers, Bytes::from_static(b"payload"))) })
    }
}

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
    fn on_event(&self, event: &HttpEvent<'_>) -> std::result::Result<(), SubscriberError> {
        self.seen.lock().expect("lock").push(event.name().to_string());
        Ok(())
    }
}

fn request() -> Request {
    let url: url::Url = "https://api.example.com/items".parse().expect("url");
    Request::builder(Method::Get, url).build()
}

fn config(json: &str) -> PipelineConfig {
    PipelineConfig::from_json(json).expect("valid config")
}

#[tokio::test]
async fn retries_happen_inside_the_cache() {
    let base = ScriptedBase::new(vec![500, 500, 200]);
    let handle = base.clone();

    let config = config(
        r#"{
        "cache": { "default": { "enabled": true } },
        "retry": {
            "default": {
                "enabled": true,
                "max_retries": 2,
                "backoff": { "fixed": { "ms": 1 } }
            }
        }
    }"#,
    );

    let pipeline = Pipeline::builder(config)
        .backend(Arc::new(MemoryBackend::new()))
        .build_with(BoxCloneService::new(base))
        .expect("pipeline");

    let first = pipeline.execute(request()).await.expect("first");
    assert_eq!(first.status(), 200);
    assert_eq!(handle.calls(), 3);

    // The retried success was cached once; repeat calls never hit the base
    let second = pipeline.execute(request()).await.expect("second");
    assert_eq!(second.status(), 200);
    assert_eq!(handle.calls(), 3);
}

#[tokio::test]
async fn events_frame_cache_hits_too() {
    let base = ScriptedBase::new(vec![200]);
    let handle = base.clone();
    let recorder = Recorder::new();

    let config = config(
        r#"{
        "cache": { "default": { "enabled": true } },
        "events": { "default": { "enabled": true } }
    }"#,
    );

    let pipeline = Pipeline::builder(config)
        .backend(Arc::new(MemoryBackend::new()))
        .subscriber(recorder.clone())
        .build_with(BoxCloneService::new(base))
        .expect("pipeline");

    pipeline.execute(request()).await.expect("first");
    pipeline.execute(request()).await.expect("second");

    // The second exchange was a hit, yet subscribers still saw it
    assert_eq!(handle.calls(), 1);
    assert_eq!(
        recorder.names(),
        vec!["before_send", "succeeded", "before_send", "succeeded"]
    );
}

#[tokio::test]
async fn customization_applies_before_the_cache_key() {
    let base = ScriptedBase::new(vec![200]);
    let handle = base.clone();

    let config = config(
        r#"{
        "cache": { "default": { "enabled": true } },
        "request_rules": {
            "default": {
                "enabled": true,
                "rules": [{ "type": "append_query", "name": "tenant", "value": "a" }]
            }
        }
    }"#,
    );

    let pipeline = Pipeline::builder(config)
        .backend(Arc::new(MemoryBackend::new()))
        .build_with(BoxCloneService::new(base))
        .expect("pipeline");

    pipeline.execute(request()).await.expect("response");

    // The base saw the rewritten request, and the cache keyed on it
    let seen = handle.requests.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url().query(), Some("tenant=a"));
}

#[tokio::test]
async fn cache_stores_the_raw_upstream_response() {
    let base = ScriptedBase::new(vec![200]);
    let handle = base.clone();

    // Response rewriting sits outside the cache, so stored entries keep the
    // upstream header and the rewrite applies on every replay
    let config = config(
        r#"{
        "cache": { "default": { "enabled": true } },
        "response_rules": {
            "default": {
                "enabled": true,
                "rules": [{ "type": "set_header", "name": "x-upstream", "value": "rewritten" }]
            }
        }
    }"#,
    );

    let pipeline = Pipeline::builder(config)
        .backend(Arc::new(MemoryBackend::new()))
        .build_with(BoxCloneService::new(base))
        .expect("pipeline");

    let first = pipeline.execute(request()).await.expect("first");
    let second = pipeline.execute(request()).await.expect("second");

    assert_eq!(handle.calls(), 1);
    assert_eq!(first.header("x-upstream"), Some("rewritten"));
    assert_eq!(second.header("x-upstream"), Some("rewritten"));
}

#[tokio::test]
async fn failed_exchanges_publish_failed_events() {
    #[derive(Clone)]
    struct FailingBase;

    impl Service<Request> for FailingBase {
        type Response = Response;
        type Error = Error;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _request: Request) -> Self::Future {
            Box::pin(async { Err(Error::connection("refused")) })
        }
    }

    let recorder = Recorder::new();
    let config = config(r#"{ "events": { "default": { "enabled": true } } }"#);

    let pipeline = Pipeline::builder(config)
        .subscriber(recorder.clone())
        .build_with(BoxCloneService::new(FailingBase))
        .expect("pipeline");

    let outcome = pipeline.execute(request()).await;

    assert!(matches!(outcome, Err(Error::Connection(_))));
    assert_eq!(recorder.names(), vec!["before_send", "failed"]);
}
