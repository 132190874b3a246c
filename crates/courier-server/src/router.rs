//! Inbound webhook router.
//!
//! Dispatches `/c/<type>/<uuid>/<action>` to the owning handler: resolves
//! the channel, constructs the ChannelLog, invokes the handler, writes the
//! produced events to the backend, answers with the standard envelope, and
//! persists the log, on success and error paths alike.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_backend::{Backend, BackendError};
use courier_core::{Channel, ChannelLog, ChannelType, LogError};

use crate::envelope::{DataEntry, ResponseEnvelope};
use crate::handler::{
    ChannelResolution, InboundEvent, ReceiveOutcome, ResponseOverride, SharedHandler, WebhookRoute,
};
use crate::request::{WebhookRequest, MAX_BODY_BYTES};
use crate::server::RuntimeContext;

/// Builds the inbound router over the shared runtime context.
pub fn create_router(ctx: Arc<RuntimeContext>) -> Router {
    Router::new()
        .route("/", any(index))
        .route("/c/:channel_type/:uuid/:action", any(channel_webhook))
        .route("/c/:channel_type/:action", any(typed_webhook))
        .with_state(ctx)
}

async fn index(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    let handlers: Vec<String> = ctx
        .registry
        .iter()
        .map(|h| format!("{} ({})", h.channel_name(), h.channel_type()))
        .collect();
    Json(serde_json::json!({
        "service": "courier",
        "handlers": handlers,
    }))
}

/// `/c/<type>/<uuid>/<action>`: UUID-routed webhooks.
async fn channel_webhook(
    State(ctx): State<Arc<RuntimeContext>>,
    Path((channel_type, uuid, action)): Path<(String, String, String)>,
    request: Request<Body>,
) -> Response {
    dispatch(ctx, channel_type, Some(uuid), action, request).await
}

/// `/c/<type>/<action>`: address-routed webhooks where the channel is
/// resolved from the payload.
async fn typed_webhook(
    State(ctx): State<Arc<RuntimeContext>>,
    Path((channel_type, action)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    dispatch(ctx, channel_type, None, action, request).await
}

async fn dispatch(
    ctx: Arc<RuntimeContext>,
    channel_type: String,
    uuid: Option<String>,
    action: String,
    request: Request<Body>,
) -> Response {
    let Some(handler) = ctx.registry.get(&channel_type) else {
        return error_response(StatusCode::BAD_REQUEST, "unknown channel type");
    };
    let handler = handler.clone();

    let resolution = match uuid {
        Some(_) => ChannelResolution::ByUuid,
        None => ChannelResolution::ByPayload,
    };
    let Some(route) = find_route(&handler, request.method(), &action, resolution) else {
        return error_response(StatusCode::NOT_FOUND, "not found");
    };

    let webhook_request = match buffer_request(request).await {
        Ok(req) => req,
        Err(response) => return response,
    };

    // from here on exactly one ChannelLog is persisted, whatever happens
    let mut log = ChannelLog::new(route.log_type, None, Vec::new());

    let response = handle_request(
        &ctx,
        &handler,
        &channel_type,
        uuid.as_deref(),
        &route,
        &webhook_request,
        &mut log,
    )
    .await;

    log.finalize();
    if let Err(e) = ctx.backend.write_channel_log(&log).await {
        warn!(error = %e, "error writing channel log");
    }

    response
}

#[allow(clippy::too_many_arguments)]
async fn handle_request(
    ctx: &RuntimeContext,
    handler: &SharedHandler,
    channel_type: &str,
    uuid: Option<&str>,
    route: &WebhookRoute,
    webhook_request: &WebhookRequest,
    log: &mut ChannelLog,
) -> Response {
    let channel: Option<Arc<Channel>> = match uuid {
        Some(raw) => {
            let Ok(parsed) = Uuid::parse_str(raw) else {
                log.error(LogError::other("invalid channel uuid"));
                return error_response(StatusCode::BAD_REQUEST, "invalid channel uuid");
            };
            match ctx.channel(&ChannelType::new(channel_type), parsed).await {
                Ok(channel) => {
                    log.set_channel(&channel, handler.redact_values(&channel));
                    Some(channel)
                }
                Err(e) => {
                    log.error(LogError::other(e.to_string()));
                    return error_response(e.status_code(), e.to_string());
                }
            }
        }
        None => None,
    };

    let handler_ctx = ctx.handler_context();
    let outcome = handler
        .receive(
            &handler_ctx,
            channel.as_deref(),
            route.action,
            webhook_request,
            log,
        )
        .await;

    match outcome {
        Ok(outcome) => write_outcome(ctx, outcome, log).await,
        Err(e) => {
            debug!(
                channel_type = %channel_type,
                action = %route.action,
                error = %e,
                "webhook rejected"
            );
            log.error(LogError::other(e.to_string()));
            error_response(e.status_code(), e.to_string())
        }
    }
}

fn find_route(
    handler: &SharedHandler,
    method: &Method,
    action: &str,
    resolution: ChannelResolution,
) -> Option<WebhookRoute> {
    handler
        .routes()
        .into_iter()
        .find(|r| r.method == *method && r.action == action && r.resolution == resolution)
}

async fn buffer_request(request: Request<Body>) -> Result<WebhookRequest, Response> {
    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => Ok(WebhookRequest::new(
            parts.method,
            parts.uri,
            parts.headers,
            bytes,
        )),
        Err(_) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "unable to read request body",
        )),
    }
}

/// Writes the handler's events to the backend and renders the response.
async fn write_outcome(
    ctx: &RuntimeContext,
    outcome: ReceiveOutcome,
    log: &mut ChannelLog,
) -> Response {
    let mut entries: Vec<DataEntry> = Vec::with_capacity(outcome.events.len());

    for event in outcome.events {
        match event {
            InboundEvent::Msg(msg) => match ctx.backend.write_msg(&msg).await {
                Ok(()) => entries.push(DataEntry::Msg {
                    msg_uuid: msg.uuid(),
                }),
                Err(e) => return backend_failure(e, log),
            },
            InboundEvent::Status(status) => {
                match ctx.backend.write_status_update(&status).await {
                    Ok(()) => entries.push(DataEntry::Status {
                        status: status.status(),
                        external_id: status.external_id().map(|s| s.to_string()),
                    }),
                    // a report for a message the platform already forgot
                    Err(BackendError::MsgNotFound) => entries.push(DataEntry::Info {
                        info: "message not found, ignored".to_string(),
                    }),
                    Err(e) => return backend_failure(e, log),
                }
            }
            InboundEvent::Event(event) => match ctx.backend.write_channel_event(&event).await {
                Ok(()) => entries.push(DataEntry::Event {
                    event_type: event.event_type(),
                }),
                Err(e) => return backend_failure(e, log),
            },
            InboundEvent::Ignored(reason) => entries.push(DataEntry::Info { info: reason }),
        }
    }

    if let Some(ResponseOverride {
        status,
        content_type,
        body,
    }) = outcome.response
    {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
        return (status, [(header::CONTENT_TYPE, content_type)], body).into_response();
    }

    let (status, envelope) = ResponseEnvelope::from_entries(entries);
    (status, Json(envelope)).into_response()
}

fn backend_failure(err: BackendError, log: &mut ChannelLog) -> Response {
    warn!(error = %err, "backend write failed");
    log.error(LogError::other(err.to_string()));
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "backend error")
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let (status, envelope) = ResponseEnvelope::error(status, message);
    (status, Json(envelope)).into_response()
}
