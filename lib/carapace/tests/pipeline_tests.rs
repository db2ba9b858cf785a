//! End-to-end pipeline tests using wiremock.

use std::sync::{Arc, Mutex};

use carapace::cache::MemoryBackend;
use carapace::config::PipelineConfig;
use carapace::events::{EventSubscriber, HttpEvent, SubscriberError};
use carapace::{HttpClient, Method, Pipeline, Request};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get_request(server: &MockServer, route: &str) -> Request {
    let url = url::Url::parse(&format!("{}{route}", server.uri())).expect("url");
    Request::builder(Method::Get, url).build()
}

/// The mock server listens on 127.0.0.1, so host-scoped sections use that
/// host to exercise per-host resolution against a real listener.
fn host_config(json_sections: &str) -> PipelineConfig {
    let json = format!(r#"{{ {json_sections} }}"#);
    PipelineConfig::from_json(&json).expect("valid config")
}

#[tokio::test]
async fn cached_retry_scenario() {
    let mock_server = MockServer::start().await;

    // Upstream fails twice, then recovers
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = host_config(
        r#"
        "cache": {
            "hosts": { "127.0.0.1": { "enabled": true, "ttl_secs": 60 } }
        },
        "retry": {
            "hosts": {
                "127.0.0.1": {
                    "enabled": true,
                    "max_retries": 2,
                    "backoff": { "fixed": { "ms": 10 } }
                }
            }
        }
    "#,
    );

    let pipeline = Pipeline::builder(config)
        .backend(Arc::new(MemoryBackend::new()))
        .build()
        .expect("pipeline");

    // First call: two retried failures, then the success gets cached
    let first = pipeline
        .execute(get_request(&mock_server, "/items"))
        .await
        .expect("first");
    assert_eq!(first.status(), 200);
    assert_eq!(first.body().as_ref(), b"fresh");

    // Second call: served from cache, upstream untouched
    let second = pipeline
        .execute(get_request(&mock_server, "/items"))
        .await
        .expect("second");
    assert_eq!(second.status(), 200);
    assert_eq!(second.body().as_ref(), b"fresh");

    // Mock expectations verify exactly 3 upstream hits on drop
}

#[tokio::test]
async fn request_customization_reaches_the_wire() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/users"))
        .and(header("X-Api-Version", "2"))
        .and(query_param("api_key", "secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = host_config(
        r#"
        "request_rules": {
            "default": {
                "enabled": true,
                "rules": [
                    { "type": "set_header", "name": "X-Api-Version", "value": "2" },
                    { "type": "append_query", "name": "api_key", "value": "secret" },
                    { "type": "rewrite_path_prefix", "from": "/v1", "to": "/v2" }
                ]
            }
        }
    "#,
    );

    let pipeline = Pipeline::builder(config).build().expect("pipeline");

    let response = pipeline
        .execute(get_request(&mock_server, "/v1/users"))
        .await
        .expect("response");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn response_customization_rewrites_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("X-Internal-Trace", "wire-level"),
        )
        .mount(&mock_server)
        .await;

    let config = host_config(
        r#"
        "response_rules": {
            "default": {
                "enabled": true,
                "rules": [
                    { "type": "remove_header", "name": "X-Internal-Trace" },
                    { "type": "set_header", "name": "X-Gateway", "value": "carapace" }
                ]
            }
        }
    "#,
    );

    let pipeline = Pipeline::builder(config).build().expect("pipeline");

    let response = pipeline
        .execute(get_request(&mock_server, "/info"))
        .await
        .expect("response");

    assert_eq!(response.header("X-Internal-Trace"), None);
    assert_eq!(response.header("X-Gateway"), Some("carapace"));
}

#[tokio::test]
async fn snapshots_survive_a_round_trip() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"total":3}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let config = host_config(r#" "store": { "default": { "enabled": true } } "#);
    let pipeline = Pipeline::builder(config)
        .store_root(dir.path())
        .build()
        .expect("pipeline");

    let response = pipeline
        .execute(get_request(&mock_server, "/report"))
        .await
        .expect("response");
    assert_eq!(response.status(), 200);

    // One directory per host, three artifacts per exchange
    let host_dir = dir.path().join("127.0.0.1");
    let mut names: Vec<String> = std::fs::read_dir(&host_dir)
        .expect("host dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names.len(), 3);
    assert!(names.iter().any(|n| n.ends_with(".http")));
    assert!(names.iter().any(|n| n.ends_with(".res.json")));
    assert!(names.iter().any(|n| n.ends_with(".json") && !n.ends_with(".res.json")));

    // The full snapshot restores the exchange
    let snapshot = names
        .iter()
        .find(|n| n.ends_with(".res.json"))
        .expect("snapshot");
    let bytes = std::fs::read(host_dir.join(snapshot)).expect("snapshot bytes");
    let text = String::from_utf8(bytes).expect("utf8");
    assert!(text.contains(r#""status":200"#));
}

#[tokio::test]
async fn subscribers_frame_the_exchange() {
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &HttpEvent<'_>) -> Result<(), SubscriberError> {
            self.seen.lock().expect("lock").push(event.name().to_string());
            Ok(())
        }
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });

    let config = host_config(r#" "events": { "default": { "enabled": true } } "#);
    let pipeline = Pipeline::builder(config)
        .subscriber(recorder.clone())
        .build()
        .expect("pipeline");

    pipeline
        .execute(get_request(&mock_server, "/ping"))
        .await
        .expect("response");

    let seen = recorder.seen.lock().expect("lock").clone();
    assert_eq!(seen, vec!["before_send", "succeeded"]);
}

#[tokio::test]
async fn other_hosts_keep_default_behavior() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    // Caching is enabled only for a host the mock server is not
    let config = host_config(
        r#"
        "cache": {
            "hosts": { "cached.example.com": { "enabled": true } }
        }
    "#,
    );

    let pipeline = Pipeline::builder(config)
        .backend(Arc::new(MemoryBackend::new()))
        .build()
        .expect("pipeline");

    pipeline
        .execute(get_request(&mock_server, "/items"))
        .await
        .expect("first");
    pipeline
        .execute(get_request(&mock_server, "/items"))
        .await
        .expect("second");

    // Mock expectation verifies both calls reached upstream
}
