//! WeChat Official Accounts.
//!
//! Webhook verification is a SHA-1 over the sorted (token, timestamp,
//! nonce) triple answered with the provider's `echostr`. Messages arrive
//! as XML. Sending requires a short-lived access token shared across
//! workers through the redis-backed cache; media URLs need the same token
//! appended at fetch time, which is what the attachment-request builder is
//! for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

use courier_backend::Backend;
use courier_core::{
    Channel, ChannelEvent, ChannelEventType, ChannelLog, ChannelLogType, ChannelType, LogError,
    MsgIn, MsgOut, SendError, SendResult, Urn,
};
use courier_server::{
    split_text, ChannelHandler, HandlerContext, InboundEvent, ReceiveError, ReceiveOutcome,
    Validate, WebhookRequest, WebhookRoute,
};

const API_URL: &str = "https://api.weixin.qq.com";

pub struct WeChatHandler;

#[derive(Debug, Deserialize)]
#[serde(rename = "xml")]
struct MoPayload {
    #[serde(rename = "FromUserName")]
    from_user_name: Option<String>,
    #[serde(rename = "CreateTime")]
    create_time: Option<i64>,
    #[serde(rename = "MsgType")]
    msg_type: Option<String>,
    #[serde(rename = "Content")]
    content: Option<String>,
    #[serde(rename = "MsgId")]
    msg_id: Option<String>,
    #[serde(rename = "Event")]
    event: Option<String>,
    #[serde(rename = "MediaId")]
    media_id: Option<String>,
}

impl Validate for MoPayload {
    fn validate(&self) -> Result<(), String> {
        if self.from_user_name.as_deref().unwrap_or_default().is_empty() {
            return Err("missing required field: FromUserName".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    touser: &'a str,
    msgtype: &'static str,
    text: SendText<'a>,
}

#[derive(Debug, Serialize)]
struct SendText<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    errcode: Option<i64>,
    errmsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// SHA-1 over the lexically sorted token/timestamp/nonce triple, as WeChat
/// documents for webhook verification.
pub fn verify_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut values = [token, timestamp, nonce];
    values.sort_unstable();
    hex::encode(Sha1::digest(values.concat().as_bytes()))
}

impl WeChatHandler {
    fn base_url(channel: &Channel) -> String {
        channel
            .config_str("send_url")
            .unwrap_or_else(|| API_URL.to_string())
    }

    /// Cached access token for the channel, fetching through the shared
    /// token cache so only one worker hits the token endpoint.
    async fn access_token(
        ctx: &HandlerContext<'_>,
        channel: &Channel,
    ) -> Result<String, SendError> {
        let app_id = channel
            .config_str("wechat_app_id")
            .ok_or(SendError::ChannelConfig("wechat_app_id"))?;
        let app_secret = channel
            .config_str("wechat_app_secret")
            .ok_or(SendError::ChannelConfig("wechat_app_secret"))?;
        let base = Self::base_url(channel);

        ctx.tokens
            .get_or_fetch(channel.uuid(), || async {
                let mut log = ChannelLog::new(
                    ChannelLogType::TokenFetch,
                    Some(channel),
                    vec![app_secret.clone()],
                );

                let fetched = async {
                    let trace = ctx
                        .http
                        .send(
                            ctx.http.get(&format!("{base}/cgi-bin/token")).query(&[
                                ("grant_type", "client_credential"),
                                ("appid", app_id.as_str()),
                                ("secret", app_secret.as_str()),
                            ]),
                            &mut log,
                        )
                        .await?;
                    trace.require_success()?;

                    let response: TokenResponse = trace.json()?;
                    let token = response.access_token.filter(|t| !t.is_empty()).ok_or(
                        SendError::ResponseUnexpected("no access_token in response".into()),
                    )?;
                    Ok((token, response.expires_in.unwrap_or(0)))
                }
                .await;

                log.finalize();
                if let Err(e) = ctx.backend.write_channel_log(&log).await {
                    tracing::warn!(error = %e, "error writing token fetch log");
                }

                fetched
            })
            .await
    }
}

#[async_trait]
impl ChannelHandler for WeChatHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("WC")
    }

    fn channel_name(&self) -> &'static str {
        "WeChat"
    }

    fn routes(&self) -> Vec<WebhookRoute> {
        vec![
            WebhookRoute::get("receive", ChannelLogType::WebhookVerify),
            WebhookRoute::post("receive", ChannelLogType::MsgReceive),
        ]
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config_values_for(&["secret", "wechat_app_secret"])
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

        if request.method() == axum::http::Method::GET {
            return verify_webhook(channel, request);
        }

        let payload: MoPayload = request.xml()?;
        let from = payload.from_user_name.as_deref().unwrap_or_default();
        let urn = Urn::wechat(from)?;

        match payload.msg_type.as_deref() {
            Some("event") => {
                log.set_type(ChannelLogType::EventReceive);
                match payload.event.as_deref() {
                    Some("subscribe") => {
                        let event =
                            ChannelEvent::new(channel, ChannelEventType::NewConversation, urn);
                        Ok(ReceiveOutcome::events(vec![InboundEvent::Event(event)])
                            .with_response(200, "text/plain", ""))
                    }
                    other => Ok(ReceiveOutcome::ignored(format!(
                        "unknown event type: {}",
                        other.unwrap_or("none")
                    ))
                    .with_response(200, "text/plain", "")),
                }
            }
            Some("text") => {
                let mut msg = MsgIn::new(
                    channel,
                    urn,
                    payload.content.unwrap_or_default(),
                    payload.msg_id,
                );
                if let Some(ts) = payload.create_time {
                    if let Some(received_on) = DateTime::<Utc>::from_timestamp(ts, 0) {
                        msg = msg.with_received_on(received_on);
                    }
                }
                Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)])
                    .with_response(200, "text/plain", ""))
            }
            Some("image") | Some("video") | Some("voice") => {
                let media_id = payload.media_id.as_deref().unwrap_or_default();
                if media_id.is_empty() {
                    return Err(ReceiveError::Validation(
                        "missing required field: MediaId".into(),
                    ));
                }
                // token is appended at fetch time by the attachment builder
                let media_url = format!(
                    "{}/cgi-bin/media/get?media_id={media_id}",
                    Self::base_url(channel)
                );
                let msg = MsgIn::new(channel, urn, "", payload.msg_id).with_attachment(media_url);
                Ok(ReceiveOutcome::events(vec![InboundEvent::Msg(msg)])
                    .with_response(200, "text/plain", ""))
            }
            other => Ok(ReceiveOutcome::ignored(format!(
                "unknown message type: {}",
                other.unwrap_or("none")
            ))
            .with_response(200, "text/plain", "")),
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
        let token = Self::access_token(ctx, channel).await?;
        let base = Self::base_url(channel);

        for part in split_text(&msg.text, channel.max_length(1600)) {
            let payload = SendPayload {
                touser: msg.urn.path(),
                msgtype: "text",
                text: SendText { content: &part },
            };
            let trace = ctx
                .http
                .send(
                    ctx.http
                        .post(&format!("{base}/cgi-bin/message/custom/send"))
                        .query(&[("access_token", token.as_str())])
                        .json(&payload),
                    log,
                )
                .await?;
            trace.require_success()?;

            let response: SendResponse = trace.json()?;
            let errcode = response.errcode.unwrap_or_default();
            if errcode != 0 {
                let errmsg = response.errmsg.unwrap_or_default();
                log.error(LogError::external(errcode.to_string(), errmsg.clone()));
                return Err(SendError::ResponseContent(format!(
                    "errcode {errcode}: {errmsg}"
                )));
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
        let token = Self::access_token(ctx, channel).await?;
        let base = Self::base_url(channel);

        let trace = ctx
            .http
            .send(
                ctx.http.get(&format!("{base}/cgi-bin/user/info")).query(&[
                    ("access_token", token.as_str()),
                    ("openid", urn.path()),
                ]),
                log,
            )
            .await?;
        trace.require_success()?;

        let info: serde_json::Value = trace.json()?;
        let mut attrs = HashMap::new();
        if let Some(nickname) = info.get("nickname").and_then(|v| v.as_str()) {
            if !nickname.is_empty() {
                attrs.insert("name".to_string(), nickname.to_string());
            }
        }
        Ok(attrs)
    }

    async fn build_attachment_request(
        &self,
        ctx: &HandlerContext<'_>,
        channel: &Channel,
        url: &str,
        _log: &mut ChannelLog,
    ) -> Result<Option<reqwest::Request>, SendError> {
        let token = Self::access_token(ctx, channel).await?;
        let request = ctx
            .http
            .get(url)
            .query(&[("access_token", token.as_str())])
            .build()
            .map_err(|e| SendError::Other(format!("invalid request: {e}")))?;
        Ok(Some(request))
    }
}

fn verify_webhook(
    channel: &Channel,
    request: &WebhookRequest,
) -> Result<ReceiveOutcome, ReceiveError> {
    let params = request.query_params();
    let token = channel
        .config_str("secret")
        .ok_or_else(|| ReceiveError::Validation("channel missing secret config".into()))?;
    let signature = params.get("signature").cloned().unwrap_or_default();
    let timestamp = params.get("timestamp").cloned().unwrap_or_default();
    let nonce = params.get("nonce").cloned().unwrap_or_default();
    let echostr = params.get("echostr").cloned().unwrap_or_default();

    let expected = verify_signature(&token, &timestamp, &nonce);
    if expected != signature {
        return Err(ReceiveError::Signature("signature mismatch".into()));
    }

    Ok(ReceiveOutcome::default().with_response(200, "text/plain", echostr))
}
