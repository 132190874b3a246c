//! Telegram Bot API.
//!
//! Updates arrive as JSON; incoming media is resolved to a download URL via
//! `getFile` during parsing. Outbound parts map to the per-kind send
//! endpoints, quick replies become a reply keyboard on the final part, and
//! a blocked bot surfaces as a stopped contact. File URLs embed the bot
//! token, which is why it is a redaction value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use courier_backend::MediaFamily;
use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, LogError, MsgIn, MsgOut, SendError,
    SendResult, Urn,
};
use courier_server::{
    resolve_attachments, split_msg, ChannelHandler, HandlerContext, InboundEvent, PartContent,
    ReceiveError, ReceiveOutcome, SplitOptions, Validate, WebhookRequest, WebhookRoute,
};

const API_URL: &str = "https://api.telegram.org";

pub struct TelegramHandler;

#[derive(Debug, Deserialize)]
struct Update {
    #[allow(dead_code)]
    update_id: i64,
    message: Option<TgMessage>,
}

impl Validate for Update {}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    date: i64,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<TgFile>>,
    voice: Option<TgFile>,
    document: Option<TgFile>,
    video: Option<TgFile>,
    sticker: Option<TgSticker>,
    contact: Option<TgContact>,
    location: Option<TgLocation>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgSticker {
    thumbnail: Option<TgFile>,
    // older API name for the same field
    thumb: Option<TgFile>,
}

#[derive(Debug, Deserialize)]
struct TgContact {
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct TgLocation {
    longitude: f64,
    latitude: f64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error_code: Option<i64>,
    description: Option<String>,
    result: Option<serde_json::Value>,
}

impl TelegramHandler {
    fn bot_token(channel: &Channel) -> Result<String, SendError> {
        channel
            .config_str("auth_token")
            .ok_or(SendError::ChannelConfig("auth_token"))
    }

    fn base_url(channel: &Channel) -> String {
        channel
            .config_str("send_url")
            .unwrap_or_else(|| API_URL.to_string())
    }

    /// Resolves a telegram file id to its download URL.
    async fn file_url(
        ctx: &HandlerContext<'_>,
        channel: &Channel,
        file_id: &str,
        log: &mut ChannelLog,
    ) -> Result<String, SendError> {
        let token = Self::bot_token(channel)?;
        let base = Self::base_url(channel);

        let trace = ctx
            .http
            .send(
                ctx.http
                    .post(&format!("{base}/bot{token}/getFile"))
                    .form(&[("file_id", file_id)]),
                log,
            )
            .await?;
        trace.require_success()?;

        let response: ApiResponse = trace.json()?;
        let file_path = response
            .result
            .as_ref()
            .and_then(|r| r.get("file_path"))
            .and_then(|p| p.as_str())
            .ok_or_else(|| SendError::ResponseUnexpected("no file_path in response".into()))?;

        Ok(format!("{base}/file/bot{token}/{file_path}"))
    }
}

#[async_trait]
impl ChannelHandler for TelegramHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("TG")
    }

    fn channel_name(&self) -> &'static str {
        "Telegram"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![WebhookRoute::post("receive", ChannelLogType::MsgReceive)]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["auth_token"])
    }

    async fn receive(
        &self,
        ctx: &HandlerContext<'_>,
        channel: Option<&Channel>,
        _action: &str,
        request: &WebhookRequest,
        log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        let channel = channel.expect("uuid routed");
        let update: Update = request.json()?;

        // edited messages, channel posts and the like
        let Some(message) = update.message else {
            return Ok(ReceiveOutcome::ignored("ignoring update, no message"));
        };
        let Some(from) = &message.from else {
            return Ok(ReceiveOutcome::ignored("ignoring update, no sender"));
        };

        let urn = Urn::telegram(from.id, from.username.as_deref());
        let name = [from.first_name.as_deref(), from.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        let mut text = message
            .text
            .clone()
            .or_else(|| message.caption.clone())
            .unwrap_or_default();
        if text.is_empty() {
            if let Some(contact) = &message.contact {
                text = contact.phone_number.clone();
            }
        }

        // pick the single interesting file on the message; photos come in
        // ascending sizes so the last is the original
        let file_id = message
            .photo
            .as_ref()
            .and_then(|photos| photos.last())
            .map(|f| f.file_id.clone())
            .or_else(|| message.voice.as_ref().map(|f| f.file_id.clone()))
            .or_else(|| message.video.as_ref().map(|f| f.file_id.clone()))
            .or_else(|| message.document.as_ref().map(|f| f.file_id.clone()))
            .or_else(|| {
                message.sticker.as_ref().and_then(|s| {
                    s.thumbnail
                        .as_ref()
                        .or(s.thumb.as_ref())
                        .map(|f| f.file_id.clone())
                })
            });

        let mut msg = MsgIn::new(channel, urn, text, Some(message.message_id.to_string()))
            .with_contact_name(name);
        if let Some(received_on) = DateTime::<Utc>::from_timestamp(message.date, 0) {
            msg = msg.with_received_on(received_on);
        }

        if let Some(file_id) = file_id {
            let url = Self::file_url(ctx, channel, &file_id, log)
                .await
                .map_err(|e| ReceiveError::Validation(format!("unable to resolve file: {e}")))?;
            msg = msg.with_attachment(url);
        }
        if let Some(location) = &message.location {
            msg = msg.with_attachment(format!(
                "geo:{},{}",
                location.latitude, location.longitude
            ));
        }

        Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)]))
    }

    async fn send(
        &self,
        ctx: &HandlerContext<'_>,
        msg: &MsgOut,
        result: &mut SendResult,
        log: &mut ChannelLog,
    ) -> Result<(), SendError> {
        let channel = &msg.channel;
        let token = Self::bot_token(channel)?;
        let base = Self::base_url(channel);

        let attachments =
            resolve_attachments(ctx.backend, &msg.attachments, &HashMap::new(), true).await?;
        let opts = SplitOptions {
            max_text_len: 4096,
            max_caption_len: 1024,
            captionable: vec![MediaFamily::Image, MediaFamily::Video, MediaFamily::Document],
        };

        let keyboard = if msg.quick_replies.is_empty() {
            None
        } else {
            let rows: Vec<Vec<serde_json::Value>> = msg
                .quick_replies
                .iter()
                .map(|qr| vec![serde_json::json!({"text": qr})])
                .collect();
            Some(
                serde_json::json!({
                    "keyboard": rows,
                    "resize_keyboard": true,
                    "one_time_keyboard": true,
                })
                .to_string(),
            )
        };

        for part in split_msg(msg, attachments, &opts) {
            let (endpoint, mut form): (&str, Vec<(&str, String)>) = match &part.content {
                PartContent::Text(text) => ("sendMessage", vec![("text", text.clone())]),
                PartContent::Attachment(attachment) => (
                    endpoint_for(attachment.family),
                    vec![(field_for(attachment.family), attachment.url.clone())],
                ),
                PartContent::CaptionedAttachment {
                    attachment,
                    caption,
                } => (
                    endpoint_for(attachment.family),
                    vec![
                        (field_for(attachment.family), attachment.url.clone()),
                        ("caption", caption.clone()),
                    ],
                ),
                PartContent::OptIn(_) => continue,
            };
            form.push(("chat_id", msg.urn.path().to_string()));
            if part.is_last {
                if let Some(keyboard) = &keyboard {
                    form.push(("reply_markup", keyboard.clone()));
                }
            }

            let trace = ctx
                .http
                .send(
                    ctx.http.post(&format!("{base}/bot{token}/{endpoint}")).form(&form),
                    log,
                )
                .await?;
            if trace.status >= 500 {
                return Err(SendError::ConnectionFailed);
            }

            let response: ApiResponse = trace.json()?;
            if !response.ok {
                let description = response.description.unwrap_or_default();
                if let Some(error_code) = response.error_code {
                    log.error(LogError::external(error_code.to_string(), description.clone()));
                }
                if response.error_code == Some(403) && description.contains("blocked") {
                    return Err(SendError::ContactStopped);
                }
                return Err(SendError::ResponseContent(description));
            }

            if let Some(message_id) = response
                .result
                .as_ref()
                .and_then(|r| r.get("message_id"))
                .and_then(|id| id.as_i64())
            {
                result.add_external_id(message_id.to_string());
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
        let token = Self::bot_token(channel)?;
        let base = Self::base_url(channel);

        let trace = ctx
            .http
            .send(
                ctx.http
                    .post(&format!("{base}/bot{token}/getChat"))
                    .form(&[("chat_id", urn.path())]),
                log,
            )
            .await?;
        trace.require_success()?;

        let response: ApiResponse = trace.json()?;
        let result = response.result.unwrap_or_default();
        let name = [
            result.get("first_name").and_then(|v| v.as_str()),
            result.get("last_name").and_then(|v| v.as_str()),
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

fn endpoint_for(family: MediaFamily) -> &'static str {
    match family {
        MediaFamily::Image => "sendPhoto",
        MediaFamily::Audio => "sendAudio",
        MediaFamily::Video => "sendVideo",
        MediaFamily::Document => "sendDocument",
    }
}

fn field_for(family: MediaFamily) -> &'static str {
    match family {
        MediaFamily::Image => "photo",
        MediaFamily::Audio => "audio",
        MediaFamily::Video => "video",
        MediaFamily::Document => "document",
    }
}
