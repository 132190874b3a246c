use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::channel::{Channel, ChannelType};
use crate::urn::Urn;

/// An incoming message as parsed from a provider webhook, before the
/// backend persists and queues it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgIn {
    uuid: Uuid,
    channel_uuid: Uuid,
    channel_type: ChannelType,
    urn: Urn,
    text: String,
    attachments: Vec<String>,
    external_id: Option<String>,
    received_on: Option<DateTime<Utc>>,
    contact_name: Option<String>,
}

impl MsgIn {
    pub fn new(
        channel: &Channel,
        urn: Urn,
        text: impl Into<String>,
        external_id: Option<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            channel_uuid: channel.uuid(),
            channel_type: channel.channel_type().clone(),
            urn,
            text: text.into(),
            attachments: Vec::new(),
            external_id: external_id.filter(|id| !id.is_empty()),
            received_on: None,
            contact_name: None,
        }
    }

    pub fn with_received_on(mut self, received_on: DateTime<Utc>) -> Self {
        self.received_on = Some(received_on);
        self
    }

    /// Adds a raw `contentType:url` attachment token.
    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }

    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.contact_name = Some(name);
        }
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn channel_uuid(&self) -> Uuid {
        self.channel_uuid
    }

    pub fn channel_type(&self) -> &ChannelType {
        &self.channel_type
    }

    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn received_on(&self) -> Option<DateTime<Utc>> {
        self.received_on
    }

    pub fn contact_name(&self) -> Option<&str> {
        self.contact_name.as_deref()
    }
}

/// Opt-in reference attached to an outbound message (provider notification
/// opt-in requests).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInRef {
    pub id: i64,
    pub name: String,
}

/// An outbound message popped from the work queue. Immutable to handlers;
/// the channel rides along so `send` can read provider config.
#[derive(Debug, Clone)]
pub struct MsgOut {
    pub id: i64,
    pub uuid: Uuid,
    pub channel: Arc<Channel>,
    pub urn: Urn,
    pub text: String,
    /// Raw `contentType:url` attachment tokens, in send order.
    pub attachments: Vec<String>,
    pub quick_replies: Vec<String>,
    pub topic: Option<String>,
    pub high_priority: bool,
    pub response_to_external_id: Option<String>,
    pub opt_in: Option<OptInRef>,
    pub user_ref: Option<String>,
}

impl MsgOut {
    pub fn new(id: i64, channel: Arc<Channel>, urn: Urn, text: impl Into<String>) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            channel,
            urn,
            text: text.into(),
            attachments: Vec::new(),
            quick_replies: Vec::new(),
            topic: None,
            high_priority: false,
            response_to_external_id: None,
            opt_in: None,
            user_ref: None,
        }
    }
}

/// Sink for provider-assigned message ids across a multi-part send. The
/// first id recorded becomes the primary external id of the final status.
#[derive(Debug, Default)]
pub struct SendResult {
    external_ids: Vec<String>,
}

impl SendResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_external_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.external_ids.push(id);
        }
    }

    pub fn external_ids(&self) -> &[String] {
        &self.external_ids
    }

    pub fn primary_external_id(&self) -> Option<&str> {
        self.external_ids.first().map(|s| s.as_str())
    }
}
