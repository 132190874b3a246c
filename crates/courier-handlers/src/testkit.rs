//! Shared helpers for handler test suites.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use courier_backend::MemoryBackend;
use courier_core::{Channel, MsgOut, Urn};
use courier_server::{
    create_router, AdapterRegistry, ChannelHandler, HttpxClient, RuntimeContext, ServerSettings,
    TokenCache,
};

/// Runtime context over a memory backend with a single handler registered.
pub fn runtime(backend: MemoryBackend, handler: Arc<dyn ChannelHandler>) -> Arc<RuntimeContext> {
    runtime_with_settings(backend, handler, ServerSettings::new("courier.test"))
}

pub fn runtime_with_settings(
    backend: MemoryBackend,
    handler: Arc<dyn ChannelHandler>,
    settings: ServerSettings,
) -> Arc<RuntimeContext> {
    let mut registry = AdapterRegistry::new();
    registry.register(handler);
    Arc::new(RuntimeContext::new(
        Arc::new(backend),
        Arc::new(registry),
        Arc::new(HttpxClient::new("test", false)),
        Arc::new(TokenCache::memory()),
        settings,
    ))
}

/// POSTs a body to the router, returning status, raw body, and JSON (null
/// when the response is not JSON).
pub async fn post(
    ctx: Arc<RuntimeContext>,
    path: &str,
    content_type: &str,
    body: &str,
) -> (StatusCode, String, Value) {
    let response = create_router(ctx)
        .oneshot(
            Request::post(path)
                .header("Content-Type", content_type)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

pub async fn post_with_headers(
    ctx: Arc<RuntimeContext>,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (StatusCode, String, Value) {
    let mut builder = Request::post(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = create_router(ctx)
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    read(response).await
}

pub async fn get(ctx: Arc<RuntimeContext>, path: &str) -> (StatusCode, String, Value) {
    let response = create_router(ctx)
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, String, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, text, json)
}

/// An outbound message for send tests.
pub fn outgoing(channel: Arc<Channel>, urn: Urn, text: &str) -> MsgOut {
    MsgOut::new(10, channel, urn, text)
}
