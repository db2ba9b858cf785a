//! Deterministic cache key derivation.
//!
//! Two logically identical requests (same method, normalized URI, and
//! selected headers) derive the same key regardless of header or query
//! ordering. The canonical form is kept for debugging; the sha1 digest of it
//! is what backends and file paths use.

use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::Request;
use crate::config::CacheSettings;

/// Which parts of a request participate in its key.
#[derive(Debug, Clone, Default)]
pub struct KeyOptions {
    /// Header names (case-insensitive) included in the key.
    pub headers: Vec<String>,
    /// Whether the body digest is included.
    pub include_body: bool,
}

impl From<&CacheSettings> for KeyOptions {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            headers: settings.key_headers.clone(),
            include_body: settings.key_include_body,
        }
    }
}

/// A derived cache key: canonical request identity plus its digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    canonical: String,
    digest: String,
    host: String,
}

impl CacheKey {
    /// Derive the key for a request.
    #[must_use]
    pub fn derive(request: &Request<Bytes>, options: &KeyOptions) -> Self {
        let mut canonical = format!("{} {}", request.method(), normalized_url(request));

        let mut selected: Vec<(String, &str)> = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let lowered = name.to_ascii_lowercase();
                options
                    .headers
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(&lowered))
                    .then_some((lowered, value.as_str()))
            })
            .collect();
        selected.sort();

        for (name, value) in selected {
            canonical.push_str(&format!("|{name}={value}"));
        }

        if options.include_body {
            if let Some(body) = request.body() {
                canonical.push_str(&format!("|body={}", sha1_hex(body)));
            }
        }

        let digest = sha1_hex(canonical.as_bytes());

        Self {
            canonical,
            digest,
            host: request.host().to_string(),
        }
    }

    /// The canonical request identity string.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The sha1 hex digest, usable as a backend key or file stem.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The destination host the key was derived for.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest)
    }
}

/// URL with query pairs sorted so parameter order never changes the key.
fn normalized_url(request: &Request<Bytes>) -> String {
    let url = request.url();
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        return url.as_str().to_string();
    }

    pairs.sort();
    let mut normalized = url.clone();
    normalized.query_pairs_mut().clear();
    {
        let mut serializer = normalized.query_pairs_mut();
        for (name, value) in &pairs {
            serializer.append_pair(name, value);
        }
    }
    normalized.as_str().to_string()
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
