//! Bongo Live (Tanzania/Kenya SMS aggregator).
//!
//! A single receive URL carries both incoming messages and delivery
//! reports, discriminated by the `msgtype` form field. The aggregator
//! requires an empty `text/plain` 200 acknowledgement.

use async_trait::async_trait;
use serde::Deserialize;

use courier_core::{
    Channel, ChannelLog, ChannelLogType, ChannelType, MsgIn, MsgOut, MsgStatus, SendError,
    SendResult, Urn,
};
use courier_server::{
    external_id_status, split_text, ChannelHandler, HandlerContext, InboundEvent, ReceiveError,
    ReceiveOutcome, Validate, WebhookRequest, WebhookRoute,
};

const SEND_URL: &str = "https://api.blsmsgw.com:8443/bin/send.json";

const MSG_TYPE_INCOMING: &str = "1";
const MSG_TYPE_DLR: &str = "5";

const STATUS_MAP: &[(&str, MsgStatus)] = &[
    ("1", MsgStatus::Delivered),
    ("2", MsgStatus::Sent),
    ("3", MsgStatus::Errored),
];

pub struct BongoLiveHandler;

#[derive(Debug, Deserialize)]
struct MoForm {
    id: Option<String>,
    sourceaddr: Option<String>,
    message: Option<String>,
}

impl Validate for MoForm {
    fn validate(&self) -> Result<(), String> {
        if self.id.as_deref().unwrap_or_default().is_empty() {
            return Err("missing required field: id".to_string());
        }
        if self.sourceaddr.as_deref().unwrap_or_default().is_empty() {
            return Err("missing required field: sourceaddr".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    results: Option<Vec<SendResponseResult>>,
}

#[derive(Debug, Deserialize)]
struct SendResponseResult {
    status: Option<String>,
    msgid: Option<String>,
}

#[async_trait]
impl ChannelHandler for BongoLiveHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("BL")
    }

    fn channel_name(&self) -> &'static str {
        "Bongo Live"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![WebhookRoute::post("receive", ChannelLogType::MsgReceive)]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["username", "password"])
    }

    async fn receive(
        &self,
        _ctx: &HandlerContext<'_>,
        channel: Option<&Channel>,
        _action: &str,
        request: &WebhookRequest,
        log: &mut ChannelLog,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        let channel = channel.expect("uuid routed");
        let params = request.params();
        let msg_type = params.get("msgtype").map(|s| s.as_str()).unwrap_or_default();

        match msg_type {
            MSG_TYPE_INCOMING => {
                let form: MoForm = request.form()?;
                let urn = Urn::from_tel_strict(
                    form.sourceaddr.as_deref().unwrap_or_default(),
                    channel.country(),
                )?;
                let msg = MsgIn::new(
                    channel,
                    urn,
                    form.message.unwrap_or_default(),
                    form.id,
                );
                Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)])
                    .with_response(200, "text/plain", ""))
            }
            MSG_TYPE_DLR => {
                log.set_type(ChannelLogType::MsgStatus);
                let status = external_id_status(channel, request, STATUS_MAP, "dlrid", "status")?;
                Ok(ReceiveOutcome::events(vec![InboundEvent::Status(status)])
                    .with_response(200, "text/plain", ""))
            }
            other => Err(ReceiveError::Validation(format!(
                "unknown msgtype: {other}"
            ))),
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

        for part in split_text(&msg.text, channel.max_length(160)) {
            let form = [
                ("apiusername", username.as_str()),
                ("apipassword", password.as_str()),
                ("sendername", channel.address()),
                ("destnum", msg.urn.path().trim_start_matches('+')),
                ("message", part.as_str()),
                ("dlr", "1"),
            ];
            let trace = ctx
                .http
                .send(ctx.http.post(&send_url).form(&form), log)
                .await?;
            trace.require_success()?;

            let response: SendResponse = trace.json()?;
            let first = response
                .results
                .as_deref()
                .and_then(|r| r.first())
                .ok_or_else(|| SendError::ResponseUnexpected("no results in response".into()))?;

            if first.status.as_deref() != Some("0") {
                return Err(SendError::ResponseContent(format!(
                    "received non-zero status: {}",
                    first.status.as_deref().unwrap_or("none")
                )));
            }
            if let Some(msgid) = &first.msgid {
                result.add_external_id(msgid.clone());
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
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHANNEL_UUID: &str = "8eb23e93-5ecb-45ba-b726-3b064e0c56ab";

    fn channel(backend: &MemoryBackend, send_url: Option<&str>) -> Arc<Channel> {
        let mut ch = Channel::new(
            Uuid::parse_str(CHANNEL_UUID).unwrap(),
            ChannelType::new("BL"),
            "2020",
            "KE",
        )
        .with_config("username", json!("user1"))
        .with_config("password", json!("pass1"));
        if let Some(url) = send_url {
            ch = ch.with_config("send_url", json!(url));
        }
        backend.add_channel(ch)
    }

    #[tokio::test]
    async fn receive_msg_answers_empty_plain_text() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let (status, body, _) = testkit::post(
            ctx,
            &format!("/c/bl/{CHANNEL_UUID}/receive"),
            "application/x-www-form-urlencoded",
            "msgtype=1&id=12345678&message=Msg&sourceaddr=254791541111",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");

        let msgs = backend.msgs();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].urn().to_string(), "tel:+254791541111");
        assert_eq!(msgs[0].text(), "Msg");
        assert_eq!(msgs[0].external_id(), Some("12345678"));
    }

    #[tokio::test]
    async fn replayed_webhook_is_deduped_with_same_response() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let body = "msgtype=1&id=12345678&message=Msg&sourceaddr=254791541111";
        for _ in 0..2 {
            let (status, response_body, _) = testkit::post(
                ctx.clone(),
                &format!("/c/bl/{CHANNEL_UUID}/receive"),
                "application/x-www-form-urlencoded",
                body,
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(response_body, "");
        }

        assert_eq!(backend.msgs().len(), 1);
    }

    #[tokio::test]
    async fn delivery_report_writes_status() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let (status, body, _) = testkit::post(
            ctx,
            &format!("/c/bl/{CHANNEL_UUID}/receive"),
            "application/x-www-form-urlencoded",
            "msgtype=5&dlrid=12345&status=1",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");

        let statuses = backend.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status(), MsgStatus::Delivered);
        assert_eq!(
            statuses[0].msg_ref(),
            &courier_core::MsgRef::ExternalId("12345".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_dlr_status_is_400_and_nothing_written() {
        let backend = MemoryBackend::new();
        channel(&backend, None);
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let (status, _, json) = testkit::post(
            ctx,
            &format!("/c/bl/{CHANNEL_UUID}/receive"),
            "application/x-www-form-urlencoded",
            "msgtype=5&dlrid=12345&status=12",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Error");
        assert!(backend.statuses().is_empty());
    }

    #[tokio::test]
    async fn send_posts_form_and_reads_msgid() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bin/send.json"))
            .and(body_string_contains("apiusername=user1"))
            .and(body_string_contains("destnum=255788383383"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"results": [{"status": "0", "msgid": "70790246"}]}),
            ))
            .expect(1)
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, Some(&format!("{}/bin/send.json", mock.uri())));
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let urn = Urn::from_tel_strict("+255788383383", "KE").unwrap();
        let msg = testkit::outgoing(ch, urn, "simple message");

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        let handler = BongoLiveHandler;
        handler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap();

        assert_eq!(result.primary_external_id(), Some("70790246"));
    }

    #[tokio::test]
    async fn send_nonzero_status_is_response_content_error() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [{"status": "3"}]})),
            )
            .mount(&mock)
            .await;

        let backend = MemoryBackend::new();
        let ch = channel(&backend, Some(&mock.uri()));
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let urn = Urn::from_tel_strict("+255788383383", "KE").unwrap();
        let msg = testkit::outgoing(ch, urn, "simple message");

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        let err = BongoLiveHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ResponseContent(_)));
    }

    #[tokio::test]
    async fn send_without_config_fails_fast() {
        let backend = MemoryBackend::new();
        let ch = backend.add_channel(Channel::new(
            Uuid::new_v4(),
            ChannelType::new("BL"),
            "2020",
            "KE",
        ));
        let ctx = testkit::runtime(backend.clone(), Arc::new(BongoLiveHandler));

        let urn = Urn::from_tel_strict("+255788383383", "KE").unwrap();
        let msg = testkit::outgoing(ch, urn, "simple message");

        let mut result = SendResult::new();
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec![]);
        let err = BongoLiveHandler
            .send(&ctx.handler_context(), &msg, &mut result, &mut log)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ChannelConfig("username")));
    }
}
