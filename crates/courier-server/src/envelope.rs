//! The fixed webhook response envelope.
//!
//! All framework-written responses are
//! `{"message":"<Accepted|Error|Ignored>","data":[...]}`. The `data` array
//! lets batched webhooks report one entry per result.

use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use courier_core::{ChannelEventType, MsgStatus};

/// One result entry in the envelope's `data` array.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataEntry {
    Msg {
        msg_uuid: Uuid,
    },
    Status {
        status: MsgStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        external_id: Option<String>,
    },
    Event {
        event_type: ChannelEventType,
    },
    Error {
        error: String,
    },
    Info {
        info: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub message: String,
    pub data: Vec<DataEntry>,
}

impl ResponseEnvelope {
    pub fn accepted(data: Vec<DataEntry>) -> (StatusCode, Self) {
        (
            StatusCode::OK,
            Self {
                message: "Accepted".to_string(),
                data,
            },
        )
    }

    pub fn ignored(data: Vec<DataEntry>) -> (StatusCode, Self) {
        (
            StatusCode::OK,
            Self {
                message: "Ignored".to_string(),
                data,
            },
        )
    }

    pub fn error(status: StatusCode, error: impl Into<String>) -> (StatusCode, Self) {
        (
            status,
            Self {
                message: "Error".to_string(),
                data: vec![DataEntry::Error {
                    error: error.into(),
                }],
            },
        )
    }

    /// Accepted when anything was written, Ignored when every entry was.
    pub fn from_entries(entries: Vec<DataEntry>) -> (StatusCode, Self) {
        let all_ignored = entries
            .iter()
            .all(|e| matches!(e, DataEntry::Info { .. }));
        if entries.is_empty() || all_ignored {
            Self::ignored(entries)
        } else {
            Self::accepted(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_shape() {
        let (status, envelope) = ResponseEnvelope::error(StatusCode::BAD_REQUEST, "bad field");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["message"], "Error");
        assert_eq!(json["data"][0]["type"], "error");
        assert_eq!(json["data"][0]["error"], "bad field");
    }

    #[test]
    fn entries_decide_accepted_vs_ignored() {
        let (_, env) = ResponseEnvelope::from_entries(vec![DataEntry::Msg {
            msg_uuid: Uuid::new_v4(),
        }]);
        assert_eq!(env.message, "Accepted");

        let (_, env) = ResponseEnvelope::from_entries(vec![DataEntry::Info {
            info: "unknown event type".to_string(),
        }]);
        assert_eq!(env.message, "Ignored");

        let (_, env) = ResponseEnvelope::from_entries(vec![]);
        assert_eq!(env.message, "Ignored");
    }
}
