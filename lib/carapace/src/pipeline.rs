//! Pipeline assembly.
//!
//! A [`Pipeline`] is the base transport wrapped in the decorator stack,
//! assembled once from a [`PipelineConfig`] and immutable afterwards. The
//! wrapping order is fixed, outermost first:
//!
//! 1. events
//! 2. disk snapshots
//! 3. response customization
//! 4. request customization
//! 5. cache
//! 6. retry
//! 7. delay
//!
//! So subscribers frame the whole exchange, snapshots record the request as
//! the caller issued it and the response as the caller receives it, the
//! cache sees customized requests and raw upstream responses, retries share
//! one cache entry, and the artificial delay applies to every attempt that
//! actually reaches the wire.
//!
//! Sections that are disabled for every host are skipped entirely, so an
//! empty config assembles into a bare transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::cache::CacheBackend;
use crate::client::{BoxedService, HyperClient, ServiceFuture, SyncService};
use crate::config::PipelineConfig;
use crate::events::{EventBus, EventSubscriber};
use crate::middleware::{
    CacheLayer, CustomizeRequestLayer, CustomizeResponseLayer, DelayLayer, EventLayer, RetryLayer,
    StoreLayer,
};
use crate::persist::{ArtifactWriter, Filesystem};
use crate::transport::TransportConfig;
use crate::{Error, Request, Response, Result};

/// An assembled decorator stack around a base transport.
///
/// Cheap to clone; clones share the same stack.
///
/// # Example
///
/// ```ignore
/// use carapace::{Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::from_json(include_str!("../pipeline.json"))?;
/// let pipeline = Pipeline::builder(config).build()?;
/// let response = pipeline.get("https://api.example.com/users").await?;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    service: SyncService,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start building a pipeline from a configuration.
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }
}

impl carapace_core::HttpClient for Pipeline {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.service.call(request).await
    }
}

impl Service<Request<Bytes>> for Pipeline {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        self.service.call(request)
    }
}

/// Builder for [`Pipeline`].
///
/// Collaborators that a config section needs are supplied here: a cache
/// backend when any host enables caching, a snapshot root when any host
/// enables the store, subscribers for the event section. Missing
/// collaborators fail assembly, never a request.
pub struct PipelineBuilder {
    config: PipelineConfig,
    transport: TransportConfig,
    backend: Option<Arc<dyn CacheBackend>>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    store_root: Option<PathBuf>,
    filesystem: Option<Box<dyn Filesystem>>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("subscribers", &self.subscribers.len())
            .field("store_root", &self.store_root)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Create a builder from a configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            transport: TransportConfig::default(),
            backend: None,
            subscribers: Vec::new(),
            store_root: None,
            filesystem: None,
        }
    }

    /// Set the base transport configuration.
    #[must_use]
    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Set the cache backend. Required when any host enables caching.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Register an event subscriber.
    #[must_use]
    pub fn subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Set the snapshot root directory. Required when any host enables the
    /// store.
    #[must_use]
    pub fn store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store_root = Some(root.into());
        self
    }

    /// Replace the snapshot filesystem, mainly for tests.
    #[must_use]
    pub fn filesystem(mut self, filesystem: Box<dyn Filesystem>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    /// Assemble the pipeline around the default hyper transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the configuration is invalid or
    /// an enabled section is missing its collaborator.
    pub fn build(self) -> Result<Pipeline> {
        let base = HyperClient::with_config(self.transport.clone()).boxed();
        self.build_with(base)
    }

    /// Assemble the pipeline around a custom base service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the configuration is invalid or
    /// an enabled section is missing its collaborator.
    pub fn build_with(self, base: BoxedService) -> Result<Pipeline> {
        self.config.validate()?;

        let backend = if self.config.cache_enabled_anywhere() {
            Some(self.backend.ok_or_else(|| {
                Error::configuration("caching is enabled but no cache backend was supplied")
            })?)
        } else {
            None
        };

        let writer = if self.config.store_enabled_anywhere() {
            let root = self.store_root.ok_or_else(|| {
                Error::configuration("the store is enabled but no snapshot root was supplied")
            })?;
            let writer = match self.filesystem {
                Some(filesystem) => ArtifactWriter::with_filesystem(root, filesystem),
                None => ArtifactWriter::new(root),
            };
            Some(Arc::new(writer))
        } else {
            None
        };

        // Wrap innermost first
        let mut service = base;

        if self.config.delay.iter().any(|s| s.enabled) {
            let layer = DelayLayer::new(self.config.delay.clone());
            service = BoxCloneService::new(layer.layer(service));
        }

        if self.config.retry.iter().any(|s| s.enabled) {
            let layer = RetryLayer::new(self.config.retry.clone());
            service = BoxCloneService::new(layer.layer(service));
        }

        if let Some(backend) = backend {
            let layer = CacheLayer::new(self.config.cache.clone(), backend);
            service = BoxCloneService::new(layer.layer(service));
        }

        if self.config.request_rules.iter().any(|s| s.enabled) {
            let layer = CustomizeRequestLayer::new(self.config.request_rules.clone());
            service = BoxCloneService::new(layer.layer(service));
        }

        if self.config.response_rules.iter().any(|s| s.enabled) {
            let layer = CustomizeResponseLayer::new(self.config.response_rules.clone());
            service = BoxCloneService::new(layer.layer(service));
        }

        if let Some(writer) = writer {
            let layer = StoreLayer::new(self.config.store.clone(), writer);
            service = BoxCloneService::new(layer.layer(service));
        }

        if self.config.events.iter().any(|s| s.enabled) && !self.subscribers.is_empty() {
            let mut bus = EventBus::new();
            for subscriber in self.subscribers {
                bus.subscribe(subscriber);
            }
            let layer = EventLayer::new(self.config.events.clone(), Arc::new(bus));
            service = BoxCloneService::new(layer.layer(service));
        }

        Ok(Pipeline {
            service: SyncService::new(service),
        })
    }
}
