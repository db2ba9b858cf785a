//! Response serialization for cache and disk storage.
//!
//! [`StoredResponse`] is a storable projection of a response (status,
//! headers, body), independent of the in-memory object model, so a cached
//! entry survives changes to [`Response`] internals.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Response;

/// A response flattened into a storable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// Capture a response.
    #[must_use]
    pub fn from_response(response: &Response<Bytes>) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.body().to_vec(),
        }
    }

    /// Rebuild the in-memory response.
    #[must_use]
    pub fn into_response(self) -> Response<Bytes> {
        Response::new(self.status, self.headers, Bytes::from(self.body))
    }

    /// Serialize to storable bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Deserialize from storable bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid stored response.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<&Response<Bytes>> for StoredResponse {
    fn from(response: &Response<Bytes>) -> Self {
        Self::from_response(response)
    }
}
