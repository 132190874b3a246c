//! In-memory backend for development mode and test suites.
//!
//! Implements the full [`Backend`] contract against process-local state:
//! channels are seeded up front, written messages/statuses/events/logs are
//! kept for inspection, and the outgoing queue is a plain FIFO.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use courier_core::{Channel, ChannelEvent, ChannelLog, ChannelType, MsgIn, MsgOut, MsgRef, StatusUpdate};

use crate::{Backend, BackendError, Media, Result};

#[derive(Default)]
struct Inner {
    channels: Vec<Arc<Channel>>,
    msgs: Vec<MsgIn>,
    seen_external_ids: HashSet<(Uuid, String)>,
    statuses: Vec<StatusUpdate>,
    events: Vec<ChannelEvent>,
    logs: Vec<ChannelLog>,
    outgoing: VecDeque<MsgOut>,
    media: HashMap<String, Media>,
    known_msg_external_ids: HashSet<(Uuid, String)>,
    strict_statuses: bool,
}

/// Process-local backend. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, channel: Channel) -> Arc<Channel> {
        let channel = Arc::new(channel);
        self.inner.lock().channels.push(channel.clone());
        channel
    }

    pub fn add_media(&self, media: Media) {
        self.inner.lock().media.insert(media.url.clone(), media);
    }

    pub fn push_outgoing(&self, msg: MsgOut) {
        self.inner.lock().outgoing.push_back(msg);
    }

    /// When enabled, status updates referencing external ids not registered
    /// via [`MemoryBackend::add_sent_external_id`] fail with MsgNotFound.
    pub fn set_strict_statuses(&self, strict: bool) {
        self.inner.lock().strict_statuses = strict;
    }

    pub fn add_sent_external_id(&self, channel_uuid: Uuid, external_id: impl Into<String>) {
        self.inner
            .lock()
            .known_msg_external_ids
            .insert((channel_uuid, external_id.into()));
    }

    pub fn msgs(&self) -> Vec<MsgIn> {
        self.inner.lock().msgs.clone()
    }

    pub fn statuses(&self) -> Vec<StatusUpdate> {
        self.inner.lock().statuses.clone()
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.inner.lock().events.clone()
    }

    pub fn logs(&self) -> Vec<ChannelLog> {
        self.inner.lock().logs.clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_channel(&self, channel_type: &ChannelType, uuid: Uuid) -> Result<Arc<Channel>> {
        self.inner
            .lock()
            .channels
            .iter()
            .find(|c| c.uuid() == uuid && c.channel_type() == channel_type)
            .cloned()
            .ok_or(BackendError::ChannelNotFound)
    }

    async fn get_channel_by_address(
        &self,
        channel_type: &ChannelType,
        address: &str,
    ) -> Result<Arc<Channel>> {
        self.inner
            .lock()
            .channels
            .iter()
            .find(|c| c.address() == address && c.channel_type() == channel_type)
            .cloned()
            .ok_or(BackendError::ChannelNotFound)
    }

    async fn write_msg(&self, msg: &MsgIn) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(external_id) = msg.external_id() {
            let key = (msg.channel_uuid(), external_id.to_string());
            if inner.seen_external_ids.contains(&key) {
                // duplicate delivery, already queued
                return Ok(());
            }
            inner.seen_external_ids.insert(key);
        }
        inner.msgs.push(msg.clone());
        Ok(())
    }

    async fn write_status_update(&self, status: &StatusUpdate) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.strict_statuses {
            if let MsgRef::ExternalId(external_id) = status.msg_ref() {
                let key = (status.channel_uuid(), external_id.clone());
                if !inner.known_msg_external_ids.contains(&key) {
                    return Err(BackendError::MsgNotFound);
                }
            }
        }
        inner.statuses.push(status.clone());
        Ok(())
    }

    async fn write_channel_event(&self, event: &ChannelEvent) -> Result<()> {
        self.inner.lock().events.push(event.clone());
        Ok(())
    }

    async fn write_channel_log(&self, log: &ChannelLog) -> Result<()> {
        self.inner.lock().logs.push(log.clone());
        Ok(())
    }

    async fn pop_next_outgoing_msg(&self) -> Result<Option<MsgOut>> {
        Ok(self.inner.lock().outgoing.pop_front())
    }

    async fn resolve_media(&self, url: &str) -> Result<Option<Media>> {
        Ok(self.inner.lock().media.get(url).cloned())
    }
}
