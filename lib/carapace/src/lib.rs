//! Configurable HTTP client pipeline.
//!
//! Wraps a base transport in an ordered stack of Tower decorators, each
//! toggled and tuned per destination host: caching, retries with backoff,
//! artificial latency, request/response rewriting, disk snapshots, and
//! lifecycle events.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use carapace::prelude::*;
//! use carapace::cache::MemoryBackend;
//!
//! let config = PipelineConfig::from_json(r#"{
//!     "cache": {
//!         "hosts": { "api.example.com": { "enabled": true, "ttl_secs": 60 } }
//!     },
//!     "retry": {
//!         "default": { "enabled": true, "max_retries": 2 }
//!     }
//! }"#)?;
//!
//! let pipeline = Pipeline::builder(config)
//!     .backend(Arc::new(MemoryBackend::new()))
//!     .build()?;
//!
//! let request = Request::builder(Method::Get, "https://api.example.com/users".parse()?).build();
//! let response = pipeline.execute(request).await?;
//! ```

pub mod cache;
mod client;
pub mod config;
mod connector;
pub mod events;
pub mod middleware;
pub mod persist;
mod pipeline;
pub mod prelude;
mod transport;

// Re-export client and pipeline types
pub use client::{BoxedService, HyperClient, ServiceFuture};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use transport::{TransportConfig, TransportConfigBuilder};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use carapace_core::{
    ContentType, Error, HttpClient, HttpClientExt, Method, Request, RequestBuilder, Response,
    Result, from_json, to_form, to_json,
};

// Re-export http types for status codes and headers
pub use carapace_core::{StatusCode, header};

pub use url;
