//! Response caching collaborators.
//!
//! - [`key`] - deterministic cache key derivation from request identity
//! - [`serialize`] - response to/from storable bytes
//! - [`backend`] - the key-value byte store contract and an in-memory impl
//!
//! The cache middleware itself lives in [`crate::middleware::cache`].

pub mod backend;
pub mod key;
pub mod serialize;

pub use backend::{BackendError, CacheBackend, MemoryBackend};
pub use key::{CacheKey, KeyOptions};
pub use serialize::StoredResponse;
