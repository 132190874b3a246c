//! Infobip (global SMS platform).
//!
//! Inbound messages and delivery reports arrive as JSON batches under a
//! `results` array; a batch is all-or-nothing, one bad entry rejects the
//! whole request. Two incompatible outbound APIs exist; channel config
//! `api_version` selects between `sms/1/text/advanced` and
//! `sms/3/messages`. Delivery notifications are requested back on a URL
//! derived from the callback domain.

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgIn, MsgOut, MsgStatus, SendError,
    SendResult, StatusUpdate, Urn,
};
use courier_server::{
    split_text, ChannelHandler, HandlerContext, InboundEvent, ReceiveError, ReceiveOutcome,
    Validate, WebhookRequest, WebhookRoute,
};

const API_URL: &str = "https://api.infobip.com";

const MAX_MSG_LENGTH: usize = 1600;

const STATUS_MAP: &[(&str, MsgStatus)] = &[
    ("PENDING", MsgStatus::Sent),
    ("DELIVERED", MsgStatus::Delivered),
    ("EXPIRED", MsgStatus::Errored),
    ("REJECTED", MsgStatus::Failed),
    ("UNDELIVERABLE", MsgStatus::Failed),
];

/// Status group ids that mean the message is on its way.
const ACCEPTED_GROUPS: &[i64] = &[1, 3];

pub struct InfobipHandler;

#[derive(Debug, Deserialize)]
struct MoPayload {
    results: Option<Vec<MoResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoResult {
    message_id: Option<String>,
    from: Option<String>,
    text: Option<String>,
    received_at: Option<String>,
}

impl Validate for MoPayload {
    fn validate(&self) -> Result<(), String> {
        match &self.results {
            Some(results) if !results.is_empty() => Ok(()),
            _ => Err("no results in request".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DlrPayload {
    results: Option<Vec<DlrResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DlrResult {
    message_id: Option<String>,
    status: Option<DlrStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DlrStatus {
    group_name: Option<String>,
}

impl Validate for DlrPayload {
    fn validate(&self) -> Result<(), String> {
        match &self.results {
            Some(results) if !results.is_empty() => Ok(()),
            _ => Err("no results in request".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayloadV1<'a> {
    messages: Vec<SendMessageV1<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageV1<'a> {
    from: &'a str,
    destinations: Vec<DestinationV1<'a>>,
    text: &'a str,
    notify_content_type: &'static str,
    intermediate_report: bool,
    notify_url: &'a str,
}

#[derive(Debug, Serialize)]
struct DestinationV1<'a> {
    to: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayloadV3<'a> {
    messages: Vec<SendMessageV3<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageV3<'a> {
    sender: &'a str,
    destinations: Vec<DestinationV1<'a>>,
    content: ContentV3<'a>,
    webhooks: WebhooksV3<'a>,
}

#[derive(Debug, Serialize)]
struct ContentV3<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhooksV3<'a> {
    delivery: DeliveryV3<'a>,
    content_type: &'static str,
}

#[derive(Debug, Serialize)]
struct DeliveryV3<'a> {
    url: &'a str,
    intermediate_report: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    messages: Option<Vec<SendResponseMessage>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponseMessage {
    message_id: Option<String>,
    status: Option<SendResponseStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponseStatus {
    group_id: Option<i64>,
}

#[async_trait]
impl ChannelHandler for InfobipHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("IB")
    }

    fn channel_name(&self) -> &'static str {
        "Infobip"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::post("receive", ChannelLogType::MsgReceive),
            WebhookRoute::post("delivered", ChannelLogType::MsgStatus),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["api_key"])
    }

    async fn receive(
        &self,
        _ctx: &HandlerContext<'_>,
        channel: Option<&Channel>,
        action: &str,
        request: &WebhookRequest,
        _log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        let channel = channel.expect("uuid routed");
        match action {
            "receive" => {
                let payload: MoPayload = request.json()?;
                let results = payload.results.unwrap_or_default();

                // parse the whole batch before anything is written; one bad
                // entry rejects the request
                let mut events = Vec::with_capacity(results.len());
                for result in results {
                    let from = result.from.as_deref().unwrap_or_default();
                    let urn = Urn::from_tel_strict(from, channel.country())?;
                    let mut msg = MsgIn::new(
                        channel,
                        urn,
                        result.text.unwrap_or_default(),
                        result.message_id,
                    );
                    if let Some(received_at) = &result.received_at {
                        let received_on = DateTime::parse_from_str(received_at, "%Y-%m-%dT%H:%M:%S%.3f%z")
                            .map_err(|_| {
                                ReceiveError::Validation(format!(
                                    "invalid receivedAt: {received_at}"
                                ))
                            })?;
                        msg = msg.with_received_on(received_on.with_timezone(&chrono::Utc));
                    }
                    events.push(InboundEvent::Msg(msg));
                }
                Ok(ReceiveOutcome::events(events))
            }
            "delivered" => {
                let payload: DlrPayload = request.json()?;
                let results = payload.results.unwrap_or_default();

                let mut events = Vec::with_capacity(results.len());
                for result in results {
                    let message_id = result.message_id.as_deref().unwrap_or_default();
                    if message_id.is_empty() {
                        return Err(ReceiveError::Validation(
                            "missing required field: messageId".into(),
                        ));
                    }
                    let group_name = result
                        .status
                        .as_ref()
                        .and_then(|s| s.group_name.as_deref())
                        .unwrap_or_default();
                    let status = STATUS_MAP
                        .iter()
                        .find(|(key, _)| *key == group_name)
                        .map(|(_, status)| *status)
                        .ok_or_else(|| ReceiveError::UnknownStatus(group_name.to_string()))?;
                    events.push(InboundEvent::Status(StatusUpdate::by_external_id(
                        channel, message_id, status,
                    )));
                }
                Ok(ReceiveOutcome::events(events))
            }
            other => Err(ReceiveError::Validation(format!("unknown action: {other}"))),
        }
    }

    async fn send(
        &self,
        ctx: &HandlerContext<'_>,
        msg: &MsgOut,
        result: &mut SendResult,
        log: &mut ChannelLog,
    ) -> Result<(), SendError> {
        let channel = &msg.channel;
        let api_key = channel
            .config_str("api_key")
            .ok_or(SendError::ChannelConfig("api_key"))?;
        let base_url = channel
            .config_str("send_url")
            .unwrap_or_else(|| API_URL.to_string());
        let api_version = channel
            .config_str("api_version")
            .unwrap_or_else(|| "1".to_string());

        let callback_domain = channel.callback_domain(&ctx.settings.domain);
        let notify_url = format!(
            "https://{}/c/ib/{}/delivered",
            callback_domain,
            channel.uuid()
        );

        for part in split_text(&msg.text, channel.max_length(MAX_MSG_LENGTH)) {
            let builder = match api_version.as_str() {
                "3" => {
                    let payload = SendPayloadV3 {
                        messages: vec![SendMessageV3 {
                            sender: channel.address(),
                            destinations: vec![DestinationV1 { to: msg.urn.path() }],
                            content: ContentV3 { text: &part },
                            webhooks: WebhooksV3 {
                                delivery: DeliveryV3 {
                                    url: &notify_url,
                                    intermediate_report: true,
                                },
                                content_type: "application/json",
                            },
                        }],
                    };
                    ctx.http
                        .post(&format!("{base_url}/sms/3/messages"))
                        .json(&payload)
                }
                _ => {
                    let payload = SendPayloadV1 {
                        messages: vec![SendMessageV1 {
                            from: channel.address(),
                            destinations: vec![DestinationV1 { to: msg.urn.path() }],
                            text: &part,
                            notify_content_type: "application/json",
                            intermediate_report: true,
                            notify_url: &notify_url,
                        }],
                    };
                    ctx.http
                        .post(&format!("{base_url}/sms/1/text/advanced"))
                        .json(&payload)
                }
            };

            let trace = ctx
                .http
                .send(
                    builder.header("Authorization", format!("App {api_key}")),
                    log,
                )
                .await?;
            trace.require_success()?;

            let response: SendResponse = trace.json()?;
            let first = response
                .messages
                .and_then(|m| m.into_iter().next())
                .ok_or_else(|| SendError::ResponseUnexpected("no messages in response".into()))?;

            let group_id = first
                .status
                .as_ref()
                .and_then(|s| s.group_id)
                .unwrap_or_default();
            if !ACCEPTED_GROUPS.contains(&group_id) {
                return Err(SendError::ResponseContent(format!(
                    "received unacceptable status group: {group_id}"
                )));
            }
            if let Some(id) = first.message_id {
                result.add_external_id(id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use axum::http::StatusCode;
    use courier_backend::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHANNEL_UUID: &str = "8eb23e93-5ecb-45ba-b726-3b064e0c56ab";

    fn channel(backend: &MemoryBackend, extra: &[(&str, serde_json::Value)]) -> Arc<Channel> {
        let mut ch = Channel::new(
            Uuid::parse_str(CHANNEL_UUID).unwrap(),
            ChannelType::new("IB"),
            "2020",
            "RW",
        )
        .with_config("api_key", json!("ib-api-key"));
        for (key, value) in extra {
            ch = ch.with_config(*key, value.clone());
        }
        backend.add_channel(ch)
    }

    #[tokio::test]
    async fn receive_batch_writes_every_result() {
        let backend = MemoryBackend::new();
        channel(&backend, &[]);
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let body = json!({
            "results": [
                {"messageId": "m1", "from": "250788383383", "text": "Hello", "receivedAt": "2016-10-06T09:28:39.220+0000"},
                {"messageId": "m2", "from": "250788383384", "text": "World"}
            ],
            "messageCount": 2,
            "pendingMessageCount": 0
        });

        let (status, _, envelope) = testkit::post(
            ctx,
            &format!("/c/ib/{CHANNEL_UUID}/receive"),
            "application/json",
            &body.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["message"], "Accepted");
        let msgs = backend.msgs();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].urn().to_string(), "tel:+250788383383");
        assert!(msgs[0].received_on().is_some());
    }

    #[tokio::test]
    async fn batch_with_invalid_urn_rejects_everything() {
        let backend = MemoryBackend::new();
        channel(&backend, &[]);
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let body = json!({
            "results": [
                {"messageId": "m1", "from": "250788383383", "text": "Hello"},
                {"messageId": "m2", "from": "BADSENDER", "text": "World"}
            ]
        });

        let (status, _, _) = testkit::post(
            ctx,
            &format!("/c/ib/{CHANNEL_UUID}/receive"),
            "application/json",
            &body.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(backend.msgs().is_empty());
    }

    #[tokio::test]
    async fn delivery_batch_with_unknown_group_rejects_everything() {
        let backend = MemoryBackend::new();
        channel(&backend, &[]);
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let body = json!({
            "results": [
                {"messageId": "m1", "status": {"groupName": "DELIVERED"}},
                {"messageId": "m2", "status": {"groupName": "WAT"}}
            ]
        });

        let (status, _, _) = testkit::post(
            ctx,
            &format!("/c/ib/{CHANNEL_UUID}/delivered"),
            "application/json",
            &body.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(backend.statuses().is_empty());
    }

    #[tokio::test]
    async fn delivery_batch_maps_group_names() {
        let backend = MemoryBackend::new();
        channel(&backend, &[]);
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let body = json!({
            "results": [
                {"messageId": "m1", "status": {"groupName": "DELIVERED"}},
                {"messageId": "m2", "status": {"groupName": "REJECTED"}}
            ]
        });

        let (status, _, _) = testkit::post(
            ctx,
            &format!("/c/ib/{CHANNEL_UUID}/delivered"),
            "application/json",
            &body.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let statuses = backend.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].status(), MsgStatus::Delivered);
        assert_eq!(statuses[1].status(), MsgStatus::Failed);
    }

    #[tokio::test]
    async fn send_v1_uses_advanced_api_and_notify_url() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms/1/text/advanced"))
            .and(header("Authorization", "App ib-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"messageId": "12345678", "status": {"groupId": 1}}]
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, &[("send_url", json!(mock.uri()))]);
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let urn = Urn::from_tel_strict("+250788383383", "RW").unwrap();
        let msg = testkit::outgoing(ch, urn, "hello world");

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        InfobipHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap();

        assert_eq!(result.primary_external_id(), Some("12345678"));

        // the traced request carries the callback-domain-derived notify url
        let request_body = log.http_logs()[0].request_body.clone();
        assert!(request_body
            .contains(&format!("https://courier.test/c/ib/{CHANNEL_UUID}/delivered")));
    }

    #[tokio::test]
    async fn send_v3_selected_by_config() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms/3/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"messageId": "abc999", "status": {"groupId": 1}}]
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(
            &backend,
            &[("send_url", json!(mock.uri())), ("api_version", json!("3"))],
        );
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let urn = Urn::from_tel_strict("+250788383383", "RW").unwrap();
        let msg = testkit::outgoing(ch, urn, "hello world");

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        InfobipHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap();

        assert_eq!(result.primary_external_id(), Some("abc999"));
    }

    #[tokio::test]
    async fn send_rejected_group_is_content_error() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"messageId": "x", "status": {"groupId": 5}}]
            })))
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, &[("send_url", json!(mock.uri()))]);
        let ctx = testkit::runtime(backend.clone(), Arc::new(InfobipHandler));

        let urn = Urn::from_tel_strict("+250788383383", "RW").unwrap();
        let msg = testkit::outgoing(ch, urn, "hello");

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        let err = InfobipHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ResponseContent(_)));
    }
}
