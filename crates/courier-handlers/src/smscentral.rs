//! SMS Central (Australian aggregator).
//!
//! The smallest possible adapter: tel-form receive plus a basic-auth form
//! send, composed almost entirely from the framework helpers.

use async_trait::async_trait;

use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgOut, SendError, SendResult,
};
use courier_server::{
    receive_tel_form, split_text, ChannelHandler, HandlerContext, InboundEvent, ReceiveError,
    ReceiveOutcome, WebhookRequest, WebhookRoute,
};

const SEND_URL: &str = "https://my.smscentral.com.au/api/v3.2";

pub struct SmsCentralHandler;

#[async_trait]
impl ChannelHandler for SmsCentralHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("SC")
    }

    fn channel_name(&self) -> &'static str {
        "SMS Central"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![WebhookRoute::post("receive", ChannelLogType::MsgReceive)]
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
        let msg = receive_tel_form(channel, request, "mobile", "message")?;
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
        let send_url = channel
            .config_str("send_url")
            .unwrap_or_else(|| SEND_URL.to_string());

        for part in split_text(&msg.text, channel.max_length(160)) {
            let form = [
                ("USERNAME", username.as_str()),
                ("PASSWORD", password.as_str()),
                ("ACTION", "send"),
                ("ORIGINATOR", channel.address()),
                ("RECIPIENT", msg.urn.path().trim_start_matches('+')),
                ("MESSAGE_TEXT", part.as_str()),
            ];
            let trace = ctx
                .http
                .send(ctx.http.post(&send_url).form(&form), log)
                .await?;
            trace.require_success()?;
        }

        Ok(())
    }
}
