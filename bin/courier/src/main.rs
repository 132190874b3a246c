//! Courier messaging gateway.
//!
//! Bridges third-party messaging providers to the platform work queue:
//! webhooks come in on `/c/<type>/<uuid>/<action>`, queued outbound
//! messages drain through the send worker pool.
//!
//! Configuration comes from `courier.toml` (or `COURIER_CONFIG`) with
//! `COURIER_*` environment overrides. The `memory` backend keeps all state
//! in-process and exists for development; production deployments plug a
//! real backend in at this composition point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use courier_backend::MemoryBackend;
use courier_config::ConfigLoader;
use courier_handlers::register_handlers;
use courier_server::{
    AdapterRegistry, Server, ServerOptions, ServerSettings, TokenCache,
};

#[tokio::main]
async fn main() -> Result<()> {
    // .env convenience for local development
    let _ = dotenvy::dotenv();

    courier_core::logging::init_logging("courier");

    let config = ConfigLoader::new().load()?;
    info!(
        host = %config.http.host,
        port = config.http.port,
        domain = %config.domain,
        backend = %config.backend,
        "starting courier"
    );

    // 1. Compose the adapter registry; write-once, read-only afterwards
    let mut registry = AdapterRegistry::new();
    register_handlers(&mut registry);
    info!(handlers = registry.len(), "registered channel handlers");

    // 2. Backend
    let backend = match config.backend.as_str() {
        "memory" => Arc::new(MemoryBackend::new()),
        other => {
            return Err(anyhow::anyhow!(
                "unknown backend: {other} (only \"memory\" ships with this binary)"
            ))
        }
    };

    // 3. Token cache: redis when reachable, in-process fallback for dev
    let tokens = match TokenCache::redis(&config.redis.url).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(error = %e, "redis unavailable, using in-process token cache");
            Arc::new(TokenCache::memory())
        }
    };

    // 4. Server settings handlers can read
    let mut settings = ServerSettings::new(config.domain.clone());
    for key in ["facebook_webhook_secret", "facebook_app_secret"] {
        if let Ok(value) = std::env::var(format!("COURIER_{}", key.to_ascii_uppercase())) {
            settings = settings.with(key, value);
        }
    }

    let server = Server::new(
        registry,
        backend,
        tokens,
        settings,
        ServerOptions {
            version: config.version.clone(),
            allow_insecure_tls: config.allow_insecure_tls,
            send_workers: config.sender.workers,
            send_timeout: Duration::from_secs(config.sender.send_timeout_seconds),
        },
    );

    // 5. Start the send pool and serve webhooks until ctrl-c
    server.start();

    let app = server.router().layer(TraceLayer::new_for_http());
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "courier listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Drain in-flight sends before exiting
    server.stop().await;
    info!("courier stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
