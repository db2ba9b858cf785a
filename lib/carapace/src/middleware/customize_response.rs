//! Incoming-response customization middleware.
//!
//! Applies an ordered list of header rewrite rules to each response on its
//! way back up the stack.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::config::{HostScoped, ResponseRule, ResponseRulesSettings};
use crate::{Error, Request, Response, Result};

/// Layer that rewrites incoming responses.
#[derive(Debug, Clone)]
pub struct CustomizeResponseLayer {
    settings: Arc<HostScoped<ResponseRulesSettings>>,
}

impl CustomizeResponseLayer {
    /// Create a response customization layer from host-scoped settings.
    #[must_use]
    pub fn new(settings: HostScoped<ResponseRulesSettings>) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl<S> Layer<S> for CustomizeResponseLayer {
    type Service = CustomizeResponse<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CustomizeResponse {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Service that rewrites incoming responses.
#[derive(Debug, Clone)]
pub struct CustomizeResponse<S> {
    inner: S,
    settings: Arc<HostScoped<ResponseRulesSettings>>,
}

fn remove_header(headers: &mut HashMap<String, String>, name: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
}

fn apply_rule(response: &mut Response<Bytes>, rule: &ResponseRule) {
    match rule {
        ResponseRule::SetHeader { name, value } => {
            remove_header(response.headers_mut(), name);
            response.headers_mut().insert(name.clone(), value.clone());
        }
        ResponseRule::RemoveHeader { name } => {
            remove_header(response.headers_mut(), name);
        }
    }
}

impl<S> Service<Request<Bytes>> for CustomizeResponse<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let settings = self.settings.for_host(request.host()).clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            if settings.enabled {
                for rule in &settings.rules {
                    apply_rule(&mut response, rule);
                }
            }
            Ok(response)
        })
    }
}
