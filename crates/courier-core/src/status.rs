use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::{Channel, ChannelType};

/// Lifecycle states of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgStatus {
    Pending,
    Queued,
    /// Handed to the provider's send API.
    Wired,
    Sent,
    Delivered,
    Read,
    Errored,
    Failed,
}

/// How a status update addresses the message it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgRef {
    Id(i64),
    ExternalId(String),
}

/// A change in the lifecycle state of a previously-sent outbound message,
/// produced by the send pipeline or by a delivery-report webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    channel_uuid: Uuid,
    channel_type: ChannelType,
    msg_ref: MsgRef,
    status: MsgStatus,
    /// Provider id newly learned during the send, recorded for later
    /// delivery-report correlation.
    external_id: Option<String>,
    occurred_on: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn by_id(channel: &Channel, msg_id: i64, status: MsgStatus) -> Self {
        Self {
            channel_uuid: channel.uuid(),
            channel_type: channel.channel_type().clone(),
            msg_ref: MsgRef::Id(msg_id),
            status,
            external_id: None,
            occurred_on: Utc::now(),
        }
    }

    pub fn by_external_id(channel: &Channel, external_id: impl Into<String>, status: MsgStatus) -> Self {
        Self {
            channel_uuid: channel.uuid(),
            channel_type: channel.channel_type().clone(),
            msg_ref: MsgRef::ExternalId(external_id.into()),
            status,
            external_id: None,
            occurred_on: Utc::now(),
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        let id = external_id.into();
        if !id.is_empty() {
            self.external_id = Some(id);
        }
        self
    }

    pub fn channel_uuid(&self) -> Uuid {
        self.channel_uuid
    }

    pub fn channel_type(&self) -> &ChannelType {
        &self.channel_type
    }

    pub fn msg_ref(&self) -> &MsgRef {
        &self.msg_ref
    }

    pub fn status(&self) -> MsgStatus {
        self.status
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }
}
