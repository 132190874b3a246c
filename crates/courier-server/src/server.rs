//! Server composition and lifecycle.
//!
//! The [`Server`] owns the adapter registry, the inbound router and the
//! send worker pool, and exposes the shared backend, HTTP clients and
//! token cache to handlers through [`RuntimeContext`].

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use courier_backend::Backend;
use courier_core::{Channel, ChannelType};

use crate::error::ReceiveError;
use crate::handler::HandlerContext;
use crate::httpx::HttpxClient;
use crate::registry::AdapterRegistry;
use crate::router::create_router;
use crate::sendpool::SendWorkerPool;
use crate::tokens::TokenCache;

const CHANNEL_CACHE_TTL: Duration = Duration::from_secs(60);

/// Server-level settings handlers can read: the default callback domain
/// plus free-form named values (e.g. app-level webhook secrets).
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub domain: String,
    extra: HashMap<String, String>,
}

impl ServerSettings {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            extra: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(|s| s.as_str())
    }
}

/// Shared runtime resources: the backend, registry, HTTP clients, token
/// cache, settings, and the in-process channel cache.
pub struct RuntimeContext {
    pub backend: Arc<dyn Backend>,
    pub registry: Arc<AdapterRegistry>,
    pub http: Arc<HttpxClient>,
    pub tokens: Arc<TokenCache>,
    pub settings: ServerSettings,
    channel_cache: DashMap<(String, Uuid), (Arc<Channel>, Instant)>,
}

impl RuntimeContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<AdapterRegistry>,
        http: Arc<HttpxClient>,
        tokens: Arc<TokenCache>,
        settings: ServerSettings,
    ) -> Self {
        Self {
            backend,
            registry,
            http,
            tokens,
            settings,
            channel_cache: DashMap::new(),
        }
    }

    pub fn handler_context(&self) -> HandlerContext<'_> {
        HandlerContext {
            backend: self.backend.as_ref(),
            http: &self.http,
            tokens: &self.tokens,
            settings: &self.settings,
        }
    }

    /// Loads a channel through the in-process cache.
    pub async fn channel(
        &self,
        channel_type: &ChannelType,
        uuid: Uuid,
    ) -> Result<Arc<Channel>, ReceiveError> {
        let key = (channel_type.as_str().to_string(), uuid);
        if let Some(entry) = self.channel_cache.get(&key) {
            let (channel, fetched) = entry.value();
            if fetched.elapsed() < CHANNEL_CACHE_TTL {
                return Ok(channel.clone());
            }
        }

        let channel = self.backend.get_channel(channel_type, uuid).await?;
        self.channel_cache
            .insert(key, (channel.clone(), Instant::now()));
        Ok(channel)
    }
}

/// Options for server construction, derived from app config by the binary.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub version: String,
    pub allow_insecure_tls: bool,
    pub send_workers: usize,
    pub send_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            allow_insecure_tls: true,
            send_workers: 8,
            send_timeout: Duration::from_secs(35),
        }
    }
}

/// Owns registry, router and send pool lifecycle.
pub struct Server {
    ctx: Arc<RuntimeContext>,
    pool: SendWorkerPool,
}

impl Server {
    pub fn new(
        registry: AdapterRegistry,
        backend: Arc<dyn Backend>,
        tokens: Arc<TokenCache>,
        settings: ServerSettings,
        options: ServerOptions,
    ) -> Self {
        let http = Arc::new(HttpxClient::new(&options.version, options.allow_insecure_tls));
        let ctx = Arc::new(RuntimeContext::new(
            backend,
            Arc::new(registry),
            http,
            tokens,
            settings,
        ));
        let pool = SendWorkerPool::new(options.send_workers, options.send_timeout);

        Self { ctx, pool }
    }

    pub fn context(&self) -> Arc<RuntimeContext> {
        self.ctx.clone()
    }

    /// The inbound webhook router.
    pub fn router(&self) -> axum::Router {
        create_router(self.ctx.clone())
    }

    /// Spawns the send workers.
    pub fn start(&self) {
        info!(
            handlers = self.ctx.registry.len(),
            "starting courier server"
        );
        self.pool.start(self.ctx.clone());
    }

    /// Stops the send pool, draining in-flight sends.
    pub async fn stop(&self) {
        info!("stopping courier server");
        self.pool.stop().await;
    }
}
