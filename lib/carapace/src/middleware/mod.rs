//! Tower middleware for the pipeline.
//!
//! Each middleware is a [`tower::Layer`] producing a [`tower::Service`]
//! wrapper. Settings are host-scoped: every wrapper resolves its settings
//! from the request's host on each call and passes straight through when the
//! resolved section is disabled.
//!
//! | Middleware | Purpose |
//! |------------|---------|
//! | [`EventLayer`] | Publishes lifecycle events around each exchange |
//! | [`StoreLayer`] | Persists request/response snapshots to disk |
//! | [`CustomizeResponseLayer`] | Rewrites incoming response headers |
//! | [`CustomizeRequestLayer`] | Rewrites outgoing requests |
//! | [`CacheLayer`] | Serves repeat requests from a cache backend |
//! | [`RetryLayer`] | Resends failed requests with backoff |
//! | [`DelayLayer`] | Pauses before each send |

mod cache;
mod customize_request;
mod customize_response;
mod delay;
mod event;
mod retry;
mod store;

pub use cache::{Cache, CacheLayer};
pub use customize_request::{CustomizeRequest, CustomizeRequestLayer};
pub use customize_response::{CustomizeResponse, CustomizeResponseLayer};
pub use delay::{Delay, DelayLayer};
pub use event::{Event, EventLayer};
pub use retry::{Retry, RetryLayer};
pub use store::{Store, StoreLayer};
