//! Backend contract consumed by the channel-handler runtime.
//!
//! The backend is the durable store plus work queue. The core only ever
//! talks to it through this narrow trait: channel lookup, message/status/
//! event/log writes, outgoing queue pops, and media resolution. Writes are
//! atomic at the backend level; message dedup by external id is the
//! backend's responsibility.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use courier_core::{Channel, ChannelEvent, ChannelLog, ChannelType, MsgIn, MsgOut, StatusUpdate};

pub mod media;
pub mod memory;

pub use media::{Media, MediaFamily};
pub use memory::MemoryBackend;

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("channel not found")]
    ChannelNotFound,

    /// A status update references a message the platform no longer knows.
    /// Callers downgrade this to an ignored acknowledgement.
    #[error("message not found")]
    MsgNotFound,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The durable store and work queue the gateway runs against.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Loads a channel by type and UUID. The type must match: a UUID
    /// reached through the wrong URL prefix is not found.
    async fn get_channel(&self, channel_type: &ChannelType, uuid: Uuid) -> Result<Arc<Channel>>;

    /// Loads a channel by type and provider-side address, for handlers
    /// whose webhook URLs cannot carry a channel UUID.
    async fn get_channel_by_address(
        &self,
        channel_type: &ChannelType,
        address: &str,
    ) -> Result<Arc<Channel>>;

    /// Persists and enqueues an incoming message. Idempotent on the
    /// message's external id: a replay succeeds without re-queueing.
    async fn write_msg(&self, msg: &MsgIn) -> Result<()>;

    /// Persists a status update. Returns [`BackendError::MsgNotFound`] when
    /// the referenced message is unknown.
    async fn write_status_update(&self, status: &StatusUpdate) -> Result<()>;

    async fn write_channel_event(&self, event: &ChannelEvent) -> Result<()>;

    async fn write_channel_log(&self, log: &ChannelLog) -> Result<()>;

    /// Pops the next queued outgoing message, or None when the queue is
    /// empty right now.
    async fn pop_next_outgoing_msg(&self) -> Result<Option<MsgOut>>;

    /// Resolves an attachment URL to a stored media record, or None when
    /// the URL is not hosted by the platform.
    async fn resolve_media(&self, url: &str) -> Result<Option<Media>>;
}
