//! Kannel (self-hosted SMSC gateway).
//!
//! Everything is query parameters. Delivery reports come back to a
//! dlr-url we hand Kannel at send time, correlating by our own message id
//! rather than a provider external id. The dlr-url is always derived from
//! the callback domain, never hard-coded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgIn, MsgOut, MsgStatus, SendError,
    SendResult, StatusUpdate, Urn,
};
use courier_server::{
    split_text, ChannelHandler, HandlerContext, InboundEvent, ReceiveError, ReceiveOutcome,
    WebhookRequest, WebhookRoute,
};

const STATUS_MAP: &[(&str, MsgStatus)] = &[
    ("1", MsgStatus::Delivered),
    ("2", MsgStatus::Errored),
    ("4", MsgStatus::Sent),
    ("8", MsgStatus::Sent),
    ("16", MsgStatus::Errored),
];

pub struct KannelHandler;

#[async_trait]
impl ChannelHandler for KannelHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("KN")
    }

    fn channel_name(&self) -> &'static str {
        "Kannel"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::get("receive", ChannelLogType::MsgReceive),
            WebhookRoute::post("receive", ChannelLogType::MsgReceive),
            WebhookRoute::get("status", ChannelLogType::MsgStatus),
            WebhookRoute::post("status", ChannelLogType::MsgStatus),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["password"])
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
        let params = request.params();

        match action {
            "receive" => {
                let sender = params.get("sender").filter(|v| !v.is_empty()).ok_or_else(
                    || ReceiveError::Validation("missing required field: sender".into()),
                )?;
                let message = params.get("message").cloned().unwrap_or_default();
                let external_id = params.get("id").cloned();

                let urn = Urn::from_tel_strict(sender, channel.country())?;
                let mut msg = MsgIn::new(channel, urn, message, external_id);
                if let Some(ts) = params.get("ts").and_then(|v| v.parse::<i64>().ok()) {
                    if let Some(received_on) = DateTime::<Utc>::from_timestamp(ts, 0) {
                        msg = msg.with_received_on(received_on);
                    }
                }
                Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)]))
            }
            "status" => {
                let msg_id: i64 = params
                    .get("id")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| {
                        ReceiveError::Validation("missing or invalid field: id".into())
                    })?;
                let code = params.get("status").filter(|v| !v.is_empty()).ok_or_else(
                    || ReceiveError::Validation("missing required field: status".into()),
                )?;
                let status = STATUS_MAP
                    .iter()
                    .find(|(key, _)| key == code)
                    .map(|(_, status)| *status)
                    .ok_or_else(|| ReceiveError::UnknownStatus(code.clone()))?;

                Ok(ReceiveOutcome::events(vec![InboundEvent::Status(
                    StatusUpdate::by_id(channel, msg_id, status),
                )]))
            }
            other => Err(ReceiveError::Validation(format!("unknown action: {other}"))),
        }
    }

    async fn send(
        &self,
        ctx: &HandlerContext<'_>,
        msg: &MsgOut,
        _result: &mut SendResult,
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
            .ok_or(SendError::ChannelConfig("send_url"))?;

        let callback_domain = channel.callback_domain(&ctx.settings.domain);
        let dlr_url = format!(
            "https://{}/c/kn/{}/status?id={}&status=%d",
            callback_domain,
            channel.uuid(),
            msg.id
        );

        let to = if channel.config_bool("use_national", false) {
            national_number(msg.urn.path(), channel.country())
        } else {
            msg.urn.path().to_string()
        };

        for part in split_text(&msg.text, channel.max_length(160)) {
            let mut query: Vec<(&str, &str)> = vec![
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("from", channel.address()),
                ("to", to.as_str()),
                ("text", part.as_str()),
                ("dlr-url", dlr_url.as_str()),
                ("dlr-mask", "31"),
            ];
            if channel.config_str("encoding").as_deref() == Some("unicode") {
                query.push(("coding", "2"));
                query.push(("charset", "utf8"));
            }

            let builder = ctx.http.get(&send_url).query(&query);
            let trace = if channel.config_bool("verify_ssl", true) {
                ctx.http.send(builder, log).await?
            } else {
                ctx.http.send_insecure(builder, log).await?
            };
            trace.require_success()?;
        }

        Ok(())
    }
}

/// National significant number for kannel instances that reject E.164:
/// strips the channel country's calling code when present.
fn national_number(path: &str, country: &str) -> String {
    let bare = path.trim_start_matches('+');
    if let Some(cc) = courier_core::calling_code(country) {
        if bare.starts_with(cc) && bare.len() > cc.len() + 6 {
            return bare[cc.len()..].to_string();
        }
    }
    bare.to_string()
}
