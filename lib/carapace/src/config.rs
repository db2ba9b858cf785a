//! Per-host middleware configuration.
//!
//! Every decorator resolves its settings once per request, scoped by the
//! destination host: an explicit per-host entry wins, otherwise the section
//! default applies, otherwise the built-in disabled default. Absence of
//! configuration is never an error, it means "disabled".
//!
//! Settings records are plain `serde` values so a whole [`PipelineConfig`]
//! can be loaded from JSON:
//!
//! ```
//! use carapace::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json(r#"{
//!     "cache": {
//!         "hosts": {
//!             "api.example.com": { "enabled": true, "ttl_secs": 60 }
//!         }
//!     },
//!     "retry": {
//!         "default": { "enabled": true, "max_retries": 2 }
//!     }
//! }"#).expect("valid config");
//!
//! assert!(config.cache.for_host("api.example.com").enabled);
//! assert!(!config.cache.for_host("other.example.com").enabled);
//! assert!(config.retry.for_host("anywhere.example.com").enabled);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

// ============================================================================
// Host-Scoped Resolver
// ============================================================================

/// A settings section with a default value and per-host overrides.
///
/// Lookup is a cheap map probe, safe to perform on every request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostScoped<T: Default> {
    /// Settings applied to hosts without an explicit entry.
    pub default: T,
    /// Per-host overrides, keyed by destination host.
    pub hosts: HashMap<String, T>,
}

impl<T: Default> HostScoped<T> {
    /// Create a section whose default applies to every host.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self {
            default,
            hosts: HashMap::new(),
        }
    }

    /// Add a per-host override.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, settings: T) -> Self {
        self.hosts.insert(host.into(), settings);
        self
    }

    /// Resolve the settings for a host.
    #[must_use]
    pub fn for_host(&self, host: &str) -> &T {
        self.hosts.get(host).unwrap_or(&self.default)
    }

    /// Iterate over every configured settings record (default included).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.default).chain(self.hosts.values())
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Settings for the cache middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Whether caching is active for the host.
    pub enabled: bool,
    /// Time-to-live for stored entries, in seconds.
    pub ttl_secs: u64,
    /// Header names (case-insensitive) that participate in the cache key.
    pub key_headers: Vec<String>,
    /// Whether the request body participates in the cache key.
    pub key_include_body: bool,
    /// Status codes worth caching. `None` means all 2xx.
    pub cache_on_status: Option<Vec<u16>>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 3600,
            key_headers: Vec::new(),
            key_include_body: false,
            cache_on_status: None,
        }
    }
}

impl CacheSettings {
    /// Entry time-to-live as a [`Duration`].
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Returns `true` if a response with this status should be stored.
    #[must_use]
    pub fn is_cacheable(&self, status: u16) -> bool {
        match &self.cache_on_status {
            Some(statuses) => statuses.contains(&status),
            None => (200..300).contains(&status),
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Wait-time policy between retry attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Constant wait between attempts.
    Fixed {
        /// Wait in milliseconds.
        ms: u64,
    },
    /// Wait grows by `multiplier` each attempt, starting at `base_ms`.
    Exponential {
        /// First wait in milliseconds.
        base_ms: u64,
        /// Growth factor applied per attempt.
        multiplier: u32,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed { ms: 500 }
    }
}

impl Backoff {
    /// Wait before the given attempt (1-based: the wait preceding retry N).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { ms } => Duration::from_millis(*ms),
            Self::Exponential {
                base_ms,
                multiplier,
            } => {
                let factor = u64::from(*multiplier).saturating_pow(attempt.saturating_sub(1));
                Duration::from_millis(base_ms.saturating_mul(factor))
            }
        }
    }
}

/// Settings for the retry middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Whether retries are active for the host.
    pub enabled: bool,
    /// Maximum number of resends after the first attempt.
    pub max_retries: u32,
    /// Wait policy between attempts.
    pub backoff: Backoff,
    /// Status codes that qualify for a retry. `None` means 5xx and 429.
    pub retry_on_status: Option<Vec<u16>>,
    /// Allow retrying non-idempotent requests (POST, PATCH).
    pub retry_non_idempotent: bool,
    /// Treat timeouts as retryable. Off by default so a cancelled or timed
    /// out send is surfaced rather than silently repeated.
    pub retry_on_timeout: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: None,
            retry_non_idempotent: false,
            retry_on_timeout: false,
        }
    }
}

impl RetrySettings {
    /// Returns `true` if a response with this status qualifies for a retry.
    #[must_use]
    pub fn should_retry_status(&self, status: u16) -> bool {
        match &self.retry_on_status {
            Some(statuses) => statuses.contains(&status),
            None => status >= 500 || status == 429,
        }
    }

    /// Returns `true` if the error qualifies for a retry.
    #[must_use]
    pub fn should_retry_error(&self, error: &Error) -> bool {
        if error.is_timeout() {
            return self.retry_on_timeout;
        }
        error.is_connection()
    }
}

// ============================================================================
// Delay
// ============================================================================

/// Settings for the delay middleware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    /// Whether the artificial delay is active for the host.
    pub enabled: bool,
    /// Pause before each send, in milliseconds.
    pub delay_ms: u64,
}

impl DelaySettings {
    /// Pause duration before each send.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

// ============================================================================
// Request / Response Customization
// ============================================================================

/// A single outgoing-request rewrite rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestRule {
    /// Add or overwrite a header.
    SetHeader {
        /// Header name.
        name: String,
        /// Header value.
        value: String,
    },
    /// Remove a header if present.
    RemoveHeader {
        /// Header name.
        name: String,
    },
    /// Append a query parameter.
    AppendQuery {
        /// Parameter name.
        name: String,
        /// Parameter value.
        value: String,
    },
    /// Replace a leading path prefix.
    RewritePathPrefix {
        /// Prefix to match, must start with `/`.
        from: String,
        /// Replacement, must start with `/`.
        to: String,
    },
}

impl RequestRule {
    /// Validate the rule definition. Malformed rules fail at configuration
    /// load time, never at request time.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SetHeader { name, .. } | Self::RemoveHeader { name } => {
                if name.is_empty() {
                    return Err(Error::configuration("request rule: empty header name"));
                }
            }
            Self::AppendQuery { name, .. } => {
                if name.is_empty() {
                    return Err(Error::configuration("request rule: empty query name"));
                }
            }
            Self::RewritePathPrefix { from, to } => {
                if !from.starts_with('/') || !to.starts_with('/') {
                    return Err(Error::configuration(
                        "request rule: path prefixes must start with '/'",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A single incoming-response rewrite rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseRule {
    /// Add or overwrite a header.
    SetHeader {
        /// Header name.
        name: String,
        /// Header value.
        value: String,
    },
    /// Remove a header if present.
    RemoveHeader {
        /// Header name.
        name: String,
    },
}

impl ResponseRule {
    /// Validate the rule definition.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SetHeader { name, .. } | Self::RemoveHeader { name } => {
                if name.is_empty() {
                    return Err(Error::configuration("response rule: empty header name"));
                }
            }
        }
        Ok(())
    }
}

/// Settings for the request customization middleware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestRulesSettings {
    /// Whether request rewriting is active for the host.
    pub enabled: bool,
    /// Rules applied in order to each outgoing request.
    pub rules: Vec<RequestRule>,
}

/// Settings for the response customization middleware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseRulesSettings {
    /// Whether response rewriting is active for the host.
    pub enabled: bool,
    /// Rules applied in order to each incoming response.
    pub rules: Vec<ResponseRule>,
}

// ============================================================================
// Store / Events
// ============================================================================

/// Settings for the disk snapshot middleware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Whether exchanges for the host are persisted to disk.
    pub enabled: bool,
}

/// Settings for the lifecycle event middleware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Whether lifecycle events are published for the host.
    pub enabled: bool,
}

// ============================================================================
// Pipeline Config
// ============================================================================

/// Configuration for every middleware in a pipeline.
///
/// Immutable after load; resolved per request by each decorator. The built-in
/// default disables everything, so an empty config assembles into a pure
/// passthrough around the base transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cache middleware section.
    pub cache: HostScoped<CacheSettings>,
    /// Retry middleware section.
    pub retry: HostScoped<RetrySettings>,
    /// Delay middleware section.
    pub delay: HostScoped<DelaySettings>,
    /// Request customization section.
    pub request_rules: HostScoped<RequestRulesSettings>,
    /// Response customization section.
    pub response_rules: HostScoped<ResponseRulesSettings>,
    /// Disk snapshot section.
    pub store: HostScoped<StoreSettings>,
    /// Lifecycle event section.
    pub events: HostScoped<EventSettings>,
}

impl PipelineConfig {
    /// Load a configuration from a JSON document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the document is malformed or a
    /// customization rule is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every customization rule definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for the first malformed rule.
    pub fn validate(&self) -> Result<()> {
        for settings in self.request_rules.iter() {
            for rule in &settings.rules {
                rule.validate()?;
            }
        }
        for settings in self.response_rules.iter() {
            for rule in &settings.rules {
                rule.validate()?;
            }
        }
        Ok(())
    }

    /// Returns `true` if caching is enabled for any configured host.
    #[must_use]
    pub fn cache_enabled_anywhere(&self) -> bool {
        self.cache.iter().any(|s| s.enabled)
    }

    /// Returns `true` if disk snapshots are enabled for any configured host.
    #[must_use]
    pub fn store_enabled_anywhere(&self) -> bool {
        self.store.iter().any(|s| s.enabled)
    }
}
