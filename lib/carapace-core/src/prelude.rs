//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions
//! for easy glob importing:
//!
//! ```ignore
//! use carapace_core::prelude::*;
//! ```

pub use crate::{
    ContentType, Error, HttpClient, HttpClientExt, Method, Request, RequestBuilder, Response,
    Result, from_json, to_form, to_json,
};
