//! Facebook Messenger (Graph API).
//!
//! One app-level webhook serves every page, so routes opt out of UUID
//! routing: the channel is found by matching the entry's page id against
//! configured channel addresses. Payloads are signed with HMAC-SHA1 over
//! the raw body (`X-Hub-Signature`), verified before anything is parsed.
//! Subscription verification echoes `hub.challenge` as plain text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::HashMap;

use courier_backend::Backend;
use courier_core::{
    Channel, ChannelEvent, ChannelEventType, ChannelLog, ChannelLogType, ChannelType, MsgIn,
    MsgOut, SendError, SendResult, Urn,
};
use courier_server::{
    resolve_attachments, split_msg, ChannelHandler, HandlerContext, InboundEvent, PartContent,
    ReceiveError, ReceiveOutcome, SplitOptions, Validate, WebhookRequest, WebhookRoute,
};

const GRAPH_URL: &str = "https://graph.facebook.com";
const GRAPH_VERSION: &str = "v12.0";

const MAX_MSG_LENGTH: usize = 2000;

/// Server settings keys this handler reads.
pub const SETTING_WEBHOOK_SECRET: &str = "facebook_webhook_secret";
pub const SETTING_APP_SECRET: &str = "facebook_app_secret";

const TAG_BY_TOPIC: &[(&str, &str)] = &[
    ("event", "CONFIRMED_EVENT_UPDATE"),
    ("purchase", "POST_PURCHASE_UPDATE"),
    ("account", "ACCOUNT_UPDATE"),
    ("agent", "HUMAN_AGENT"),
];

type HmacSha1 = Hmac<Sha1>;

pub struct FacebookHandler;

/// Hex HMAC-SHA1 over the raw body, the value Facebook puts after `sha1=`.
pub fn sign_body(app_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(app_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct MoPayload {
    object: Option<String>,
    entry: Option<Vec<Entry>>,
}

impl Validate for MoPayload {
    fn validate(&self) -> Result<(), String> {
        match &self.entry {
            Some(entries) if !entries.is_empty() => Ok(()),
            _ => Err("no entries in request".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    time: Option<i64>,
    messaging: Option<Vec<MessagingEvent>>,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: Option<Participant>,
    timestamp: Option<i64>,
    message: Option<Message>,
    postback: Option<Postback>,
    referral: Option<Referral>,
    optin: Option<OptIn>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    mid: Option<String>,
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
    quick_reply: Option<QuickReply>,
    attachments: Option<Vec<MoAttachment>>,
}

#[derive(Debug, Deserialize)]
struct QuickReply {
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoAttachment {
    payload: Option<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Postback {
    title: Option<String>,
    payload: Option<String>,
    referral: Option<Referral>,
}

#[derive(Debug, Deserialize)]
struct Referral {
    #[serde(rename = "ref")]
    ref_id: Option<String>,
    source: Option<String>,
    #[serde(rename = "type")]
    referral_type: Option<String>,
    ad_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptIn {
    #[serde(rename = "ref")]
    ref_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    messaging_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
    recipient: Recipient<'a>,
    message: OutMessage<'a>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Recipient<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_ref: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
struct OutMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    quick_replies: Vec<OutQuickReply<'a>>,
}

#[derive(Debug, Serialize)]
struct OutQuickReply<'a> {
    content_type: &'static str,
    title: &'a str,
    payload: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: Option<String>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
    code: Option<i64>,
}

impl FacebookHandler {
    fn base_url(channel: &Channel) -> String {
        channel
            .config_str("send_url")
            .unwrap_or_else(|| GRAPH_URL.to_string())
    }
}

#[async_trait]
impl ChannelHandler for FacebookHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("FBA")
    }

    fn channel_name(&self) -> &'static str {
        "Facebook"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::get("receive", ChannelLogType::WebhookVerify).by_payload(),
            WebhookRoute::post("receive", ChannelLogType::MsgReceive).by_payload(),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["auth_token"])
    }

    async fn receive(
        &self,
        ctx: &HandlerContext<'_>,
        _channel: Option<&Channel>,
        _action: &str,
        request: &WebhookRequest,
        log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        if request.method() == axum::http::Method::GET {
            return verify_webhook(ctx, request);
        }

        // signature covers the raw body, checked before any parsing
        if let Some(app_secret) = ctx.settings.get(SETTING_APP_SECRET) {
            let header = request.header("X-Hub-Signature").unwrap_or_default();
            let expected = format!("sha1={}", sign_body(app_secret, request.body()));
            if header != expected {
                return Err(ReceiveError::Signature(
                    "invalid request signature".to_string(),
                ));
            }
        }

        let payload: MoPayload = request.json()?;
        if payload.object.as_deref() != Some("page") {
            return Ok(ReceiveOutcome::ignored("ignoring request, not a page object"));
        }
        let entries = payload.entry.unwrap_or_default();

        // all events in the webhook belong to the page in the first entry
        let page_id = entries
            .first()
            .and_then(|e| e.id.as_deref())
            .ok_or_else(|| ReceiveError::Validation("missing entry id".to_string()))?;
        let channel = ctx
            .backend
            .get_channel_by_address(&self.channel_type(), page_id)
            .await?;
        log.set_channel(&channel, self.redact_values(&channel));

        let mut events = Vec::new();
        for entry in &entries {
            let entry_time = entry.time;
            for messaging in entry.messaging.as_deref().unwrap_or_default() {
                let sender_id = messaging
                    .sender
                    .as_ref()
                    .and_then(|s| s.id.as_deref())
                    .unwrap_or_default();
                if sender_id.is_empty() {
                    return Err(ReceiveError::Validation("missing sender id".to_string()));
                }
                let urn = Urn::facebook(sender_id)?;
                let occurred_on = messaging
                    .timestamp
                    .or(entry_time)
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .unwrap_or_else(Utc::now);

                if let Some(message) = &messaging.message {
                    if message.is_echo {
                        events.push(InboundEvent::Ignored("ignoring echo message".to_string()));
                        continue;
                    }
                    let text = message
                        .quick_reply
                        .as_ref()
                        .and_then(|qr| qr.payload.clone())
                        .or_else(|| message.text.clone())
                        .unwrap_or_default();
                    let mut msg = MsgIn::new(&channel, urn, text, message.mid.clone())
                        .with_received_on(occurred_on);
                    for attachment in message.attachments.as_deref().unwrap_or_default() {
                        if let Some(url) = attachment.payload.as_ref().and_then(|p| p.url.clone())
                        {
                            msg = msg.with_attachment(url);
                        }
                    }
                    events.push(InboundEvent::Msg(msg));
                } else if let Some(postback) = &messaging.postback {
                    let event_type = if postback.payload.as_deref() == Some("get_started") {
                        ChannelEventType::NewConversation
                    } else {
                        ChannelEventType::Referral
                    };
                    let mut event = ChannelEvent::new(&channel, event_type, urn)
                        .with_occurred_on(occurred_on);
                    if let Some(title) = &postback.title {
                        event = event.with_extra("title", title.clone());
                    }
                    if let Some(payload) = &postback.payload {
                        event = event.with_extra("payload", payload.clone());
                    }
                    if let Some(referral) = &postback.referral {
                        if let Some(ref_id) = &referral.ref_id {
                            event = event.with_extra("referrer_id", ref_id.clone());
                        }
                        if let Some(source) = &referral.source {
                            event = event.with_extra("source", source.clone());
                        }
                    }
                    events.push(InboundEvent::Event(event));
                } else if let Some(referral) = &messaging.referral {
                    let mut event =
                        ChannelEvent::new(&channel, ChannelEventType::Referral, urn)
                            .with_occurred_on(occurred_on);
                    if let Some(ref_id) = &referral.ref_id {
                        event = event.with_extra("referrer_id", ref_id.clone());
                    }
                    if let Some(source) = &referral.source {
                        event = event.with_extra("source", source.clone());
                    }
                    if let Some(referral_type) = &referral.referral_type {
                        event = event.with_extra("type", referral_type.clone());
                    }
                    if let Some(ad_id) = &referral.ad_id {
                        event = event.with_extra("ad_id", ad_id.clone());
                    }
                    events.push(InboundEvent::Event(event));
                } else if let Some(optin) = &messaging.optin {
                    let mut event = ChannelEvent::new(&channel, ChannelEventType::OptIn, urn)
                        .with_occurred_on(occurred_on);
                    if let Some(ref_id) = &optin.ref_id {
                        event = event.with_extra("referrer_id", ref_id.clone());
                    }
                    events.push(InboundEvent::Event(event));
                } else {
                    events.push(InboundEvent::Ignored(
                        "ignoring unknown messaging event".to_string(),
                    ));
                }
            }
        }

        Ok(ReceiveOutcome::events(events))
    }

    async fn send(
        &self,
        ctx: &HandlerContext<'_>,
        msg: &MsgOut,
        result: &mut SendResult,
        log: &mut ChannelLog,
    ) -> Result<(), SendError> {
        let channel = &msg.channel;
        let access_token = channel
            .config_str("auth_token")
            .ok_or(SendError::ChannelConfig("auth_token"))?;
        let base = Self::base_url(channel);
        let send_url = format!("{base}/{GRAPH_VERSION}/me/messages");

        let (messaging_type, tag) = if let Some(topic) = &msg.topic {
            let tag = TAG_BY_TOPIC
                .iter()
                .find(|(key, _)| key == topic)
                .map(|(_, tag)| *tag);
            ("MESSAGE_TAG", tag)
        } else if msg.response_to_external_id.is_some() {
            ("RESPONSE", None)
        } else {
            ("UPDATE", None)
        };

        let recipient = match &msg.user_ref {
            Some(user_ref) => Recipient {
                id: None,
                user_ref: Some(user_ref),
            },
            None => Recipient {
                id: Some(msg.urn.path()),
                user_ref: None,
            },
        };

        let attachments =
            resolve_attachments(ctx.backend, &msg.attachments, &HashMap::new(), true).await?;
        let opts = SplitOptions {
            max_text_len: channel.max_length(MAX_MSG_LENGTH),
            max_caption_len: 0,
            captionable: Vec::new(),
        };

        for part in split_msg(msg, attachments, &opts) {
            let mut message = OutMessage::default();
            match &part.content {
                PartContent::Text(text) => message.text = Some(text),
                PartContent::Attachment(attachment)
                | PartContent::CaptionedAttachment { attachment, .. } => {
                    let attachment_type = match attachment.family {
                        courier_backend::MediaFamily::Image => "image",
                        courier_backend::MediaFamily::Audio => "audio",
                        courier_backend::MediaFamily::Video => "video",
                        courier_backend::MediaFamily::Document => "file",
                    };
                    message.attachment = Some(serde_json::json!({
                        "type": attachment_type,
                        "payload": {"url": attachment.url, "is_reusable": true}
                    }));
                }
                PartContent::OptIn(opt_in) => {
                    message.attachment = Some(serde_json::json!({
                        "type": "template",
                        "payload": {
                            "template_type": "notification_messages",
                            "title": opt_in.name,
                            "payload": opt_in.id.to_string()
                        }
                    }));
                }
            }
            if part.is_last {
                message.quick_replies = msg
                    .quick_replies
                    .iter()
                    .map(|qr| OutQuickReply {
                        content_type: "text",
                        title: qr,
                        payload: qr,
                    })
                    .collect();
            }

            let payload = SendPayload {
                messaging_type,
                tag,
                recipient,
                message,
            };

            let trace = ctx
                .http
                .send(
                    ctx.http
                        .post(&send_url)
                        .query(&[("access_token", access_token.as_str())])
                        .json(&payload),
                    log,
                )
                .await?;

            let response: SendResponse = trace.json().unwrap_or(SendResponse {
                message_id: None,
                error: None,
            });
            if let Some(error) = &response.error {
                // the contact deleted the conversation or blocked the page
                if error.code == Some(551) {
                    return Err(SendError::ContactStopped);
                }
            }
            trace.require_success()?;

            if let Some(message_id) = response.message_id {
                result.add_external_id(message_id);
            } else {
                return Err(SendError::ResponseUnexpected(
                    "no message_id in response".to_string(),
                ));
            }
        }

        Ok(())
    }

    async fn describe_urn(
        &self,
        ctx: &HandlerContext<'_>,
        channel: &Channel,
        urn: &Urn,
        log: &mut ChannelLog,
    ) -> Result<HashMap<String, String>, SendError> {
        let access_token = channel
            .config_str("auth_token")
            .ok_or(SendError::ChannelConfig("auth_token"))?;
        let base = Self::base_url(channel);

        let trace = ctx
            .http
            .send(
                ctx.http
                    .get(&format!("{base}/{GRAPH_VERSION}/{}", urn.path()))
                    .query(&[
                        ("fields", "first_name,last_name"),
                        ("access_token", access_token.as_str()),
                    ]),
                log,
            )
            .await?;
        trace.require_success()?;

        let profile: serde_json::Value = trace.json()?;
        let name = [
            profile.get("first_name").and_then(|v| v.as_str()),
            profile.get("last_name").and_then(|v| v.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

        let mut attrs = HashMap::new();
        if !name.is_empty() {
            attrs.insert("name".to_string(), name);
        }
        Ok(attrs)
    }
}

fn verify_webhook(
    ctx: &HandlerContext<'_>,
    request: &WebhookRequest,
) -> Result<ReceiveOutcome, ReceiveError> {
    let params = request.query_params();
    if params.get("hub.mode").map(|s| s.as_str()) != Some("subscribe") {
        return Err(ReceiveError::Validation("unknown hub.mode".to_string()));
    }

    let secret = ctx.settings.get(SETTING_WEBHOOK_SECRET).unwrap_or_default();
    if secret.is_empty() || params.get("hub.verify_token").map(|s| s.as_str()) != Some(secret) {
        return Err(ReceiveError::Signature("token does not match".to_string()));
    }

    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
    Ok(ReceiveOutcome::default().with_response(200, "text/plain", challenge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use axum::http::StatusCode;
    use courier_backend::MemoryBackend;
    use courier_server::ServerSettings;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE_ID: &str = "1234567890";

    fn settings() -> ServerSettings {
        ServerSettings::new("courier.test")
            .with(SETTING_WEBHOOK_SECRET, "fb_webhook_secret")
            .with(SETTING_APP_SECRET, "fb_app_secret")
    }

    fn channel(backend: &MemoryBackend, base_url: Option<&str>) -> Arc<Channel> {
        let mut ch = Channel::new(
            Uuid::new_v4(),
            ChannelType::new("FBA"),
            PAGE_ID,
            "US",
        )
        .with_config("auth_token", json!("page-access-token"));
        if let Some(url) = base_url {
            ch = ch.with_config("send_url", json!(url));
        }
        backend.add_channel(ch)
    }

    fn message_payload() -> serde_json::Value {
        json!({
            "object": "page",
            "entry": [{
                "id": PAGE_ID,
                "time": 1459991487970u64,
                "messaging": [{
                    "sender": {"id": "5678"},
                    "recipient": {"id": PAGE_ID},
                    "timestamp": 1459991487970u64,
                    "message": {
                        "mid": "external_id",
                        "text": "Hello World",
                        "attachments": [{"type": "image", "payload": {"url": "https://image-url/foo.png"}}]
                    }
                }]
            }]
        })
    }

    #[tokio::test]
    async fn verify_echoes_challenge_with_matching_token() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime_with_settings(
            backend.clone(),
            Arc::new(FacebookHandler),
            settings(),
        );

        let (status, body, _) = testkit::get(
            ctx.clone(),
            "/c/fba/receive?hub.mode=subscribe&hub.verify_token=fb_webhook_secret&hub.challenge=yarchallenge",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "yarchallenge");

        let (status, _, _) = testkit::get(
            ctx,
            "/c/fba/receive?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=yarchallenge",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_message_writes_msg_with_attachment() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime_with_settings(
            backend.clone(),
            Arc::new(FacebookHandler),
            settings(),
        );

        let body = message_payload().to_string();
        let signature = format!("sha1={}", sign_body("fb_app_secret", body.as_bytes()));

        let (status, _, envelope) = testkit::post_with_headers(
            ctx,
            "/c/fba/receive",
            &[
                ("Content-Type", "application/json"),
                ("X-Hub-Signature", &signature),
            ],
            &body,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["message"], "Accepted");
        let msgs = backend.msgs();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].urn().to_string(), "facebook:5678");
        assert_eq!(msgs[0].text(), "Hello World");
        assert_eq!(msgs[0].external_id(), Some("external_id"));
        assert_eq!(msgs[0].attachments(), &["https://image-url/foo.png".to_string()]);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_parsing() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime_with_settings(
            backend.clone(),
            Arc::new(FacebookHandler),
            settings(),
        );

        let (status, _, _) = testkit::post_with_headers(
            ctx,
            "/c/fba/receive",
            &[
                ("Content-Type", "application/json"),
                ("X-Hub-Signature", "sha1=deadbeef"),
            ],
            &message_payload().to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(backend.msgs().is_empty());
    }

    #[tokio::test]
    async fn unknown_page_id_is_400() {
        let backend = MemoryBackend::new();
        // no channel registered for the page
        let ctx = testkit::runtime_with_settings(
            backend.clone(),
            Arc::new(FacebookHandler),
            ServerSettings::new("courier.test"),
        );

        let (status, _, _) = testkit::post(
            ctx,
            "/c/fba/receive",
            "application/json",
            &message_payload().to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_started_postback_is_new_conversation() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime_with_settings(
            backend.clone(),
            Arc::new(FacebookHandler),
            ServerSettings::new("courier.test"),
        );

        let body = json!({
            "object": "page",
            "entry": [{
                "id": PAGE_ID,
                "time": 1459991487970u64,
                "messaging": [{
                    "sender": {"id": "5678"},
                    "postback": {
                        "title": "get started",
                        "payload": "get_started",
                        "referral": {"ref": "postback ref", "source": "SHORTLINK"}
                    }
                }]
            }]
        });

        let (status, _, _) = testkit::post(
            ctx,
            "/c/fba/receive",
            "application/json",
            &body.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let events = backend.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), ChannelEventType::NewConversation);
        assert_eq!(
            events[0].extra().get("referrer_id").map(|s| s.as_str()),
            Some("postback ref")
        );
    }

    #[tokio::test]
    async fn send_text_with_quick_replies() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v12.0/me/messages"))
            .and(body_partial_json(json!({
                "messaging_type": "UPDATE",
                "recipient": {"id": "5678"},
                "message": {
                    "text": "Are you happy?",
                    "quick_replies": [
                        {"content_type": "text", "title": "Yes", "payload": "Yes"},
                        {"content_type": "text", "title": "No", "payload": "No"}
                    ]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message_id": "mid.133", "recipient_id": "5678"
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, Some(&mock.uri()));
        let ctx = testkit::runtime(backend.clone(), Arc::new(FacebookHandler));

        let mut msg = testkit::outgoing(ch, Urn::facebook("5678").unwrap(), "Are you happy?");
        msg.quick_replies = vec!["Yes".to_string(), "No".to_string()];

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        FacebookHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap();

        assert_eq!(result.primary_external_id(), Some("mid.133"));
    }

    #[tokio::test]
    async fn unavailable_user_is_contact_stopped() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "This person isn't available right now.", "code": 551}
            })))
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, Some(&mock.uri()));
        let ctx = testkit::runtime(backend.clone(), Arc::new(FacebookHandler));

        let msg = testkit::outgoing(ch, Urn::facebook("5678").unwrap(), "hello");
        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        let err = FacebookHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ContactStopped));
    }

    #[tokio::test]
    async fn topic_maps_to_message_tag() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "messaging_type": "MESSAGE_TAG",
                "tag": "ACCOUNT_UPDATE"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message_id": "mid.1"
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, Some(&mock.uri()));
        let ctx = testkit::runtime(backend.clone(), Arc::new(FacebookHandler));

        let mut msg = testkit::outgoing(ch, Urn::facebook("5678").unwrap(), "update!");
        msg.topic = Some("account".to_string());

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        FacebookHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap();
    }
}
