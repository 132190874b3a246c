//! Shared test fixtures: a mock channel handler and runtime wiring.

use async_trait::async_trait;
use std::sync::Arc;

use courier_backend::{Backend, MemoryBackend};
use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgOut, MsgStatus, SendError, SendResult,
};
use courier_server::{
    external_id_status, receive_tel_form, AdapterRegistry, ChannelHandler, HandlerContext,
    InboundEvent, ReceiveError, ReceiveOutcome, RuntimeContext, ServerSettings, TokenCache,
    WebhookRequest, WebhookRoute,
};

/// Handler with one of every route shape, driven by channel config:
/// `send_result` picks what `send` does so pool classification is testable.
pub struct MockHandler;

#[async_trait]
impl ChannelHandler for MockHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("MK")
    }

    fn channel_name(&self) -> &'static str {
        "Mock"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::post("receive", ChannelLogType::MsgReceive),
            WebhookRoute::post("status", ChannelLogType::MsgStatus),
            WebhookRoute::get("verify", ChannelLogType::WebhookVerify),
            WebhookRoute::post("receive", ChannelLogType::MsgReceive).by_payload(),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["secret"])
    }

    async fn receive(
        &self,
        ctx: &HandlerContext<'_>,
        channel: Option<&Channel>,
        action: &str,
        request: &WebhookRequest,
        log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        match action {
            "receive" => {
                let channel = match channel {
                    Some(channel) => channel.clone(),
                    None => {
                        // payload-routed: match `to` against channel addresses
                        let params = request.params();
                        let to = params
                            .get("to")
                            .ok_or_else(|| ReceiveError::Validation("missing field: to".into()))?;
                        let resolved = ctx
                            .backend
                            .get_channel_by_address(&self.channel_type(), to)
                            .await?;
                        log.set_channel(&resolved, self.redact_values(&resolved));
                        (*resolved).clone()
                    }
                };
                let msg = receive_tel_form(&channel, request, "from", "text")?;
                Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)]))
            }
            "status" => {
                let channel = channel.expect("status route is uuid routed");
                let status = external_id_status(
                    channel,
                    request,
                    &[("1", MsgStatus::Delivered), ("2", MsgStatus::Errored)],
                    "id",
                    "status",
                )?;
                Ok(ReceiveOutcome::events(vec![InboundEvent::Status(status)]))
            }
            "verify" => {
                let challenge = request
                    .query_params()
                    .get("challenge")
                    .cloned()
                    .unwrap_or_default();
                Ok(ReceiveOutcome::default().with_response(200, "text/plain", challenge))
            }
            _ => Err(ReceiveError::Validation(format!("unknown action: {action}"))),
        }
    }

    async fn send(
        &self,
        _ctx: &HandlerContext<'_>,
        msg: &MsgOut,
        result: &mut SendResult,
        _log: &mut ChannelLog,
    ) -> Result<(), SendError> {
        match msg
            .channel
            .config_str("send_result")
            .as_deref()
            .unwrap_or("ok")
        {
            "ok" => {
                result.add_external_id("ext-123");
                Ok(())
            }
            "ok_no_id" => Ok(()),
            "stopped" => Err(SendError::ContactStopped),
            "partial_then_connection" => {
                result.add_external_id("part-1");
                Err(SendError::ConnectionFailed)
            }
            "bad_config" => Err(SendError::ChannelConfig("api_key")),
            "bad_status" => Err(SendError::ResponseStatus(403)),
            "bad_content" => Err(SendError::ResponseContent("status was FAILURE".into())),
            other => Err(SendError::Other(format!("unknown send_result: {other}"))),
        }
    }
}

pub fn runtime(backend: MemoryBackend) -> Arc<RuntimeContext> {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(MockHandler));
    Arc::new(RuntimeContext::new(
        Arc::new(backend),
        Arc::new(registry),
        Arc::new(courier_server::HttpxClient::new("test", false)),
        Arc::new(TokenCache::memory()),
        ServerSettings::new("courier.test"),
    ))
}
