//! Yo! (Uganda SMS aggregator).
//!
//! GET-style send API answering url-encoded bodies; the aggregator runs
//! several hosts which are tried in order on connection failure. A
//! `BLACKLISTED` autocreate message means the contact opted out.

use async_trait::async_trait;
use std::collections::HashMap;

use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgOut, SendError, SendResult,
};
use courier_server::{
    receive_tel_form, split_text, ChannelHandler, HandlerContext, InboundEvent, ReceiveError,
    ReceiveOutcome, WebhookRequest, WebhookRoute,
};

const SEND_URLS: &[&str] = &[
    "http://smgw1.yo.co.ug:9100/sendsms",
    "http://41.220.12.201:9100/sendsms",
    "http://164.40.148.210:9100/sendsms",
];

pub struct YoHandler;

#[async_trait]
impl ChannelHandler for YoHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("YO")
    }

    fn channel_name(&self) -> &'static str {
        "Yo!"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::get("receive", ChannelLogType::MsgReceive),
            WebhookRoute::post("receive", ChannelLogType::MsgReceive),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["password"])
    }

    async fn receive(
        &self,
        _ctx: &HandlerContext<'_>,
        channel: Option<&Channel>,
        _action: &str,
        request: &WebhookRequest,
        _log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        let channel = channel.expect("uuid routed");
        let msg = receive_tel_form(channel, request, "sender", "message")?;
        Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)]))
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

        let send_urls: Vec<String> = match channel.config_str("send_url") {
            Some(url) => vec![url],
            None => SEND_URLS.iter().map(|s| s.to_string()).collect(),
        };

        for part in split_text(&msg.text, channel.max_length(160)) {
            let mut sent = false;

            for (i, send_url) in send_urls.iter().enumerate() {
                let builder = ctx.http.get(send_url).query(&[
                    ("ybsacctno", username.as_str()),
                    ("password", password.as_str()),
                    ("origin", channel.address()),
                    ("sms_content", part.as_str()),
                    ("destinations", msg.urn.path().trim_start_matches('+')),
                ]);

                let trace = match ctx.http.send(builder, log).await {
                    Ok(trace) => trace,
                    // try the next host before giving up
                    Err(SendError::ConnectionFailed) if i + 1 < send_urls.len() => continue,
                    Err(e) => return Err(e),
                };
                trace.require_success()?;

                let body = trace.body_str();
                let response: HashMap<String, String> =
                    serde_urlencoded::from_str(&body).unwrap_or_default();

                match response.get("ybs_autocreate_status").map(|s| s.as_str()) {
                    Some("OK") => {
                        sent = true;
                        break;
                    }
                    Some("ERROR") => {
                        let message = response
                            .get("ybs_autocreate_message")
                            .cloned()
                            .unwrap_or_default();
                        if message.contains("BLACKLISTED") {
                            return Err(SendError::ContactStopped);
                        }
                        return Err(SendError::ResponseContent(message));
                    }
                    _ => {
                        return Err(SendError::ResponseUnexpected(
                            "no ybs_autocreate_status in response".into(),
                        ))
                    }
                }
            }

            if !sent {
                return Err(SendError::ConnectionFailed);
            }
        }

        Ok(())
    }
}
