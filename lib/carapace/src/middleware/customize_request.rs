//! Outgoing-request customization middleware.
//!
//! Applies an ordered list of rewrite rules to each request before it goes
//! down the stack: header set/remove, query parameter append, and path
//! prefix rewrite.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::config::{HostScoped, RequestRule, RequestRulesSettings};
use crate::{Error, Request, Response, Result};

/// Layer that rewrites outgoing requests.
#[derive(Debug, Clone)]
pub struct CustomizeRequestLayer {
    settings: Arc<HostScoped<RequestRulesSettings>>,
}

impl CustomizeRequestLayer {
    /// Create a request customization layer from host-scoped settings.
    #[must_use]
    pub fn new(settings: HostScoped<RequestRulesSettings>) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl<S> Layer<S> for CustomizeRequestLayer {
    type Service = CustomizeRequest<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CustomizeRequest {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Service that rewrites outgoing requests.
#[derive(Debug, Clone)]
pub struct CustomizeRequest<S> {
    inner: S,
    settings: Arc<HostScoped<RequestRulesSettings>>,
}

/// Header names are case-insensitive: drop every variant of `name`.
fn remove_header(headers: &mut HashMap<String, String>, name: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
}

fn apply_rule(request: &mut Request<Bytes>, rule: &RequestRule) {
    match rule {
        RequestRule::SetHeader { name, value } => {
            remove_header(request.headers_mut(), name);
            request.headers_mut().insert(name.clone(), value.clone());
        }
        RequestRule::RemoveHeader { name } => {
            remove_header(request.headers_mut(), name);
        }
        RequestRule::AppendQuery { name, value } => {
            request.url_mut().query_pairs_mut().append_pair(name, value);
        }
        RequestRule::RewritePathPrefix { from, to } => {
            let path = request.url().path().to_string();
            // The prefix must end at a segment boundary: "/v1" rewrites
            // "/v1" and "/v1/users" but not "/v1x/users"
            if let Some(rest) = path.strip_prefix(from.as_str()) {
                if rest.is_empty() || rest.starts_with('/') {
                    let rewritten = format!("{to}{rest}");
                    request.url_mut().set_path(&rewritten);
                }
            }
        }
    }
}

impl<S> Service<Request<Bytes>> for CustomizeRequest<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        let settings = self.settings.for_host(request.host());
        if settings.enabled {
            for rule in &settings.rules {
                apply_rule(&mut request, rule);
            }
        }
        self.inner.call(request)
    }
}
