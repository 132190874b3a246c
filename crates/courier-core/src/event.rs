use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::channel::{Channel, ChannelType};
use crate::urn::Urn;

/// Non-message events a provider webhook can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    NewConversation,
    Referral,
    StopContact,
    WelcomeMessage,
    OptIn,
    OptOut,
}

/// A contact-level event on a channel, e.g. a new conversation starting or
/// a contact opting out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    uuid: Uuid,
    channel_uuid: Uuid,
    channel_type: ChannelType,
    event_type: ChannelEventType,
    urn: Urn,
    occurred_on: DateTime<Utc>,
    extra: HashMap<String, String>,
}

impl ChannelEvent {
    pub fn new(channel: &Channel, event_type: ChannelEventType, urn: Urn) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            channel_uuid: channel.uuid(),
            channel_type: channel.channel_type().clone(),
            event_type,
            urn,
            occurred_on: Utc::now(),
            extra: HashMap::new(),
        }
    }

    pub fn with_occurred_on(mut self, occurred_on: DateTime<Utc>) -> Self {
        self.occurred_on = occurred_on;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
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

    pub fn event_type(&self) -> ChannelEventType {
        self.event_type
    }

    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    pub fn extra(&self) -> &HashMap<String, String> {
        &self.extra
    }
}
