//! The polymorphic adapter contract.
//!
//! Each provider implements [`ChannelHandler`]: route registration, inbound
//! parsing, outbound sending, redaction values, and the optional URN
//! describer and attachment-request builder. Handlers are stateless value
//! objects; provider-wide caches live in the shared [`TokenCache`].

use async_trait::async_trait;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use courier_backend::Backend;
use courier_core::{
    Channel, ChannelEvent, ChannelLog, ChannelLogType, ChannelType, MsgIn, MsgOut, SendError,
    SendResult, StatusUpdate, Urn,
};

use crate::error::ReceiveError;
use crate::httpx::HttpxClient;
use crate::request::WebhookRequest;
use crate::server::ServerSettings;
use crate::tokens::TokenCache;

/// How the router resolves the channel for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelResolution {
    /// Channel UUID is in the URL path (the default).
    ByUuid,
    /// The webhook URL carries no UUID; the handler matches a payload
    /// field against configured channel addresses.
    ByPayload,
}

/// One registered webhook route, relative to `/c/<type>/<uuid>/`.
#[derive(Debug, Clone)]
pub struct WebhookRoute {
    pub method: Method,
    pub action: &'static str,
    pub log_type: ChannelLogType,
    pub resolution: ChannelResolution,
}

impl WebhookRoute {
    pub fn post(action: &'static str, log_type: ChannelLogType) -> Self {
        Self {
            method: Method::POST,
            action,
            log_type,
            resolution: ChannelResolution::ByUuid,
        }
    }

    pub fn get(action: &'static str, log_type: ChannelLogType) -> Self {
        Self {
            method: Method::GET,
            action,
            log_type,
            resolution: ChannelResolution::ByUuid,
        }
    }

    pub fn by_payload(mut self) -> Self {
        self.resolution = ChannelResolution::ByPayload;
        self
    }
}

/// Shared runtime resources handed to every handler invocation.
pub struct HandlerContext<'a> {
    pub backend: &'a dyn Backend,
    pub http: &'a HttpxClient,
    pub tokens: &'a TokenCache,
    pub settings: &'a ServerSettings,
}

/// Something an inbound webhook produced, in payload order. The router
/// performs the backend writes after the handler returns, so a handler
/// error means nothing was persisted.
#[derive(Debug)]
pub enum InboundEvent {
    Msg(MsgIn),
    Status(StatusUpdate),
    Event(ChannelEvent),
    /// Payload understood but deliberately not modeled, acknowledged so the
    /// provider does not retry.
    Ignored(String),
}

/// Response written instead of the standard envelope, for providers that
/// require a specific acknowledgement body.
#[derive(Debug, Clone)]
pub struct ResponseOverride {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// What an inbound handler call produced.
#[derive(Debug, Default)]
pub struct ReceiveOutcome {
    pub events: Vec<InboundEvent>,
    pub response: Option<ResponseOverride>,
}

impl ReceiveOutcome {
    pub fn events(events: Vec<InboundEvent>) -> Self {
        Self {
            events,
            response: None,
        }
    }

    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            events: vec![InboundEvent::Ignored(reason.into())],
            response: None,
        }
    }

    pub fn with_response(mut self, status: u16, content_type: &str, body: impl Into<String>) -> Self {
        self.response = Some(ResponseOverride {
            status,
            content_type: content_type.to_string(),
            body: body.into(),
        });
        self
    }
}

/// Per-provider protocol adapter.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Stable 2-4 character code used in URL routing and registry lookup.
    fn channel_type(&self) -> ChannelType;

    fn channel_name(&self) -> &'static str;

    /// Webhook routes this handler serves. Called once at startup while the
    /// registry is composed.
    fn routes(&self) -> Vec<WebhookRoute>;

    /// Every secret substring for the channel, masked in logs before
    /// persistence.
    fn redact_values(&self, channel: &Channel) -> Vec<String>;

    /// Handles one inbound webhook. `channel` is None for
    /// [`ChannelResolution::ByPayload`] routes; the handler resolves it and
    /// binds it to the log itself.
    async fn receive(
        &self,
        ctx: &HandlerContext<'_>,
        channel: Option<&Channel>,
        action: &str,
        request: &WebhookRequest,
        log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError>;

    /// Dispatches one outbound message, accumulating provider message ids
    /// into `result`. Must return errors from the closed [`SendError`] set.
    async fn send(
        &self,
        ctx: &HandlerContext<'_>,
        msg: &MsgOut,
        result: &mut SendResult,
        log: &mut ChannelLog,
    ) -> Result<(), SendError>;

    /// Queries the provider for contact attributes (display name). Handlers
    /// without a lookup API return an empty map.
    async fn describe_urn(
        &self,
        _ctx: &HandlerContext<'_>,
        _channel: &Channel,
        _urn: &Urn,
        _log: &mut ChannelLog,
    ) -> Result<HashMap<String, String>, SendError> {
        Ok(HashMap::new())
    }

    /// Builds an authenticated request the backend can execute to fetch
    /// media whose URLs require dynamic credentials.
    async fn build_attachment_request(
        &self,
        _ctx: &HandlerContext<'_>,
        _channel: &Channel,
        _url: &str,
        _log: &mut ChannelLog,
    ) -> Result<Option<reqwest::Request>, SendError> {
        Ok(None)
    }
}

/// Convenience alias used throughout the runtime.
pub type SharedHandler = Arc<dyn ChannelHandler>;
