//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions
//! for easy glob importing:
//!
//! ```ignore
//! use carapace::prelude::*;
//! ```

pub use crate::cache::{CacheBackend, MemoryBackend};
pub use crate::config::PipelineConfig;
pub use crate::events::{EventSubscriber, HttpEvent};
pub use crate::{
    ContentType, Error, HttpClient, HttpClientExt, HyperClient, Method, Pipeline, Request,
    RequestBuilder, Response, Result, StatusCode, TransportConfig, from_json, header, to_form,
    to_json,
};
pub use serde::{Deserialize, Serialize};
