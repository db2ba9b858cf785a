//! Cache backend contract and the in-memory implementation.
//!
//! A backend is a key-value byte store with per-entry expiration. Expired
//! entries are a miss, never an error, and backend failures are absorbed by
//! the cache middleware (logged, treated as a miss).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use derive_more::{Display, Error};

/// Error from a cache backend operation.
///
/// Never fatal to a request: the cache middleware logs it and falls through
/// to the inner sender.
#[derive(Debug, Display, Error)]
#[display("cache backend error: {message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Create a backend error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Key-value byte store with expiration.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the value for a key. Expired entries must be reported as `None`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    /// Store a value under a key. `None` means no expiry.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>)
    -> Result<(), BackendError>;

    /// Remove the value for a key, if present.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-memory cache backend.
///
/// Single-process and advisory: reads and writes are safe under concurrent
/// access, last-write-wins on key collisions. Expired entries are dropped
/// on read.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet evicted) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Ok(Some(entry.value.clone())),
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.entries.remove(key);
        Ok(())
    }
}
