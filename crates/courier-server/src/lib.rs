//! Courier channel-handler runtime.
//!
//! This crate is the framework every provider adapter plugs into:
//! - ChannelHandler: the polymorphic adapter contract
//! - AdapterRegistry: write-once map from channel type code to handler
//! - Router: axum multiplexer for `/c/<type>/<uuid>/<action>` webhooks
//! - ResponseEnvelope: the fixed success/error/ignored response shape
//! - WebhookRequest: bounded body buffering with form/JSON/XML decoding
//! - HttpxClient: shared TLS-verifying and TLS-insecure clients, every
//!   round trip traced into the current ChannelLog
//! - MessageSplitter / MediaResolver: outbound part and attachment logic
//! - SendWorkerPool: drains the outgoing queue through handler `send`
//! - TokenCache: redis-backed provider access tokens with fetch locking

pub mod envelope;
pub mod error;
pub mod handler;
pub mod helpers;
pub mod httpx;
pub mod media;
pub mod registry;
pub mod request;
pub mod router;
pub mod sendpool;
pub mod server;
pub mod split;
pub mod tokens;

pub use envelope::{DataEntry, ResponseEnvelope};
pub use error::ReceiveError;
pub use handler::{
    ChannelHandler, ChannelResolution, HandlerContext, InboundEvent, ReceiveOutcome,
    ResponseOverride, WebhookRoute,
};
pub use helpers::{external_id_status, receive_tel_form};
pub use httpx::{HttpxClient, TraceResponse};
pub use media::{resolve_attachments, Attachment, MediaSupport};
pub use registry::AdapterRegistry;
pub use request::{Validate, WebhookRequest, MAX_BODY_BYTES};
pub use router::create_router;
pub use sendpool::SendWorkerPool;
pub use server::{RuntimeContext, Server, ServerOptions, ServerSettings};
pub use split::{split_msg, split_text, MsgPart, PartContent, SplitOptions};
pub use tokens::{TokenCache, DEFAULT_TOKEN_TTL_SECONDS};
