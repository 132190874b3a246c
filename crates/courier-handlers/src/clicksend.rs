//! ClickSend (global SMS API).
//!
//! JSON send API behind basic auth; delivery reports and incoming messages
//! arrive as forms. The basic-auth value itself is a redaction target: it
//! appears verbatim in request headers.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgOut, MsgStatus, SendError, SendResult,
};
use courier_server::{
    external_id_status, receive_tel_form, split_text, ChannelHandler, HandlerContext,
    InboundEvent, ReceiveError, ReceiveOutcome, WebhookRequest, WebhookRoute,
};

const SEND_URL: &str = "https://rest.clicksend.com/v3/sms/send";

const MAX_MSG_LENGTH: usize = 1224;

const STATUS_MAP: &[(&str, MsgStatus)] = &[
    ("Delivered", MsgStatus::Delivered),
    ("Undelivered", MsgStatus::Failed),
    ("Expired", MsgStatus::Errored),
];

pub struct ClickSendHandler;

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    messages: Vec<SendMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    to: &'a str,
    from: &'a str,
    body: &'a str,
    source: &'static str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    data: Option<SendResponseData>,
}

#[derive(Debug, Deserialize)]
struct SendResponseData {
    messages: Option<Vec<SendResponseMessage>>,
}

#[derive(Debug, Deserialize)]
struct SendResponseMessage {
    status: Option<String>,
    message_id: Option<String>,
}

fn basic_auth(username: &str, password: &str) -> String {
    BASE64_STANDARD.encode(format!("{username}:{password}"))
}

#[async_trait]
impl ChannelHandler for ClickSendHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("CS")
    }

    fn channel_name(&self) -> &'static str {
        "ClickSend"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::post("receive", ChannelLogType::MsgReceive),
            WebhookRoute::post("status", ChannelLogType::MsgStatus),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        let mut values = channel.config_values_for(&["password"]);
        if let (Some(username), Some(password)) = (
            channel.config_str("username"),
            channel.config_str("password"),
        ) {
            values.push(basic_auth(&username, &password));
        }
        values
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
                let msg = receive_tel_form(channel, request, "from", "body")?;
                Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)]))
            }
            "status" => {
                let status =
                    external_id_status(channel, request, STATUS_MAP, "message_id", "status")?;
                Ok(ReceiveOutcome::events(vec![InboundEvent::Status(status)]))
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
        let username = channel
            .config_str("username")
            .ok_or(SendError::ChannelConfig("username"))?;
        let password = channel
            .config_str("password")
            .ok_or(SendError::ChannelConfig("password"))?;
        let send_url = channel
            .config_str("send_url")
            .unwrap_or_else(|| SEND_URL.to_string());
        let auth = basic_auth(&username, &password);

        for part in split_text(&msg.text, channel.max_length(MAX_MSG_LENGTH)) {
            let payload = SendPayload {
                messages: vec![SendMessage {
                    to: msg.urn.path(),
                    from: channel.address(),
                    body: &part,
                    source: "courier",
                }],
            };

            let trace = ctx
                .http
                .send(
                    ctx.http
                        .post(&send_url)
                        .header("Content-Type", "application/json")
                        .header("Authorization", format!("Basic {auth}"))
                        .json(&payload),
                    log,
                )
                .await?;
            trace.require_success()?;

            let response: SendResponse = trace.json()?;
            let first = response
                .data
                .and_then(|d| d.messages)
                .and_then(|m| m.into_iter().next())
                .ok_or_else(|| SendError::ResponseUnexpected("no messages in response".into()))?;

            if first.status.as_deref() != Some("SUCCESS") {
                return Err(SendError::ResponseContent(format!(
                    "received non-SUCCESS status: {}",
                    first.status.as_deref().unwrap_or("none")
                )));
            }
            if let Some(id) = first.message_id {
                result.add_external_id(id);
            }
        }

        Ok(())
    }
}
