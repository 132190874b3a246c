//! Per-operation structured logging.
//!
//! A ChannelLog captures every HTTP round trip and classified error for one
//! inbound request or one outbound send attempt. Before persistence the
//! redactor substring-replaces every configured secret in every trace
//! field; redaction values are never compared against the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::channel::Channel;

/// Mask written over redacted secrets.
pub const REDACTION_MASK: &str = "**********";

/// What operation a log records. May be adjusted mid-request, e.g. when a
/// shared receive URL turns out to carry a delivery report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLogType {
    Unknown,
    MsgReceive,
    MsgSend,
    MsgStatus,
    EventReceive,
    TokenFetch,
    AttachmentFetch,
    WebhookVerify,
}

/// One HTTP round trip inside a channel operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpLog {
    pub method: String,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body: String,
    pub response_status: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body: String,
    pub elapsed_ms: u64,
}

/// A classified error entry: a code from the closed set, a message, and
/// optionally the provider's own error code when one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_code: Option<String>,
}

impl LogError {
    fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            ext_code: None,
        }
    }

    pub fn response_status(status: u16) -> Self {
        Self::new("response_status", format!("provider returned status {status}"))
    }

    pub fn response_value_missing(field: &str) -> Self {
        Self::new(
            "response_value_missing",
            format!("response value missing: {field}"),
        )
    }

    pub fn response_value_unexpected(field: &str, allowed: &[&str]) -> Self {
        Self::new(
            "response_value_unexpected",
            format!(
                "response value unexpected for {field}, allowed: {}",
                allowed.join(", ")
            ),
        )
    }

    pub fn channel_config(message: impl Into<String>) -> Self {
        Self::new("channel_config", message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new("connection", message.into())
    }

    /// A failure the provider reported in its payload, keyed by the
    /// provider's own error code.
    pub fn external(ext_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("external", message.into()).with_ext_code(ext_code)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new("error", message.into())
    }

    pub fn with_ext_code(mut self, ext_code: impl Into<String>) -> Self {
        let ext_code = ext_code.into();
        if !ext_code.is_empty() {
            self.ext_code = Some(ext_code);
        }
        self
    }
}

/// Structured record of one inbound request or one outbound send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLog {
    uuid: Uuid,
    log_type: ChannelLogType,
    channel_uuid: Option<Uuid>,
    #[serde(skip)]
    redact_values: Vec<String>,
    http_logs: Vec<HttpLog>,
    errors: Vec<LogError>,
    created_on: DateTime<Utc>,
    elapsed_ms: u64,
    #[serde(skip, default = "Instant::now")]
    started: Instant,
}

impl ChannelLog {
    pub fn new(log_type: ChannelLogType, channel: Option<&Channel>, redact_values: Vec<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            log_type,
            channel_uuid: channel.map(|c| c.uuid()),
            redact_values,
            http_logs: Vec::new(),
            errors: Vec::new(),
            created_on: Utc::now(),
            elapsed_ms: 0,
            started: Instant::now(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn log_type(&self) -> ChannelLogType {
        self.log_type
    }

    /// Reclassifies the log once the payload reveals what it really is.
    pub fn set_type(&mut self, log_type: ChannelLogType) {
        self.log_type = log_type;
    }

    pub fn channel_uuid(&self) -> Option<Uuid> {
        self.channel_uuid
    }

    /// Binds the log to a channel resolved after creation (payload-routed
    /// webhooks), adding the channel's redaction values.
    pub fn set_channel(&mut self, channel: &Channel, redact_values: Vec<String>) {
        self.channel_uuid = Some(channel.uuid());
        self.add_redact_values(redact_values);
    }

    pub fn add_redact_values(&mut self, values: Vec<String>) {
        for value in values {
            if !value.is_empty() && !self.redact_values.contains(&value) {
                self.redact_values.push(value);
            }
        }
    }

    pub fn add_http_log(&mut self, http_log: HttpLog) {
        self.http_logs.push(http_log);
    }

    pub fn error(&mut self, error: LogError) {
        self.errors.push(error);
    }

    pub fn http_logs(&self) -> &[HttpLog] {
        &self.http_logs
    }

    pub fn errors(&self) -> &[LogError] {
        &self.errors
    }

    pub fn is_errored(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Stamps the duration and masks every redaction value in every trace
    /// field and error message. Must be called exactly once, right before
    /// the log is handed to the backend.
    pub fn finalize(&mut self) {
        self.elapsed_ms = self.started.elapsed().as_millis() as u64;

        if self.redact_values.is_empty() {
            return;
        }
        let values = std::mem::take(&mut self.redact_values);

        for http_log in &mut self.http_logs {
            http_log.url = redact(&http_log.url, &values);
            http_log.request_body = redact(&http_log.request_body, &values);
            http_log.response_body = redact(&http_log.response_body, &values);
            for (_, v) in &mut http_log.request_headers {
                *v = redact(v, &values);
            }
            for (_, v) in &mut http_log.response_headers {
                *v = redact(v, &values);
            }
        }
        for error in &mut self.errors {
            error.message = redact(&error.message, &values);
        }
    }
}

fn redact(s: &str, values: &[String]) -> String {
    let mut out = s.to_string();
    for value in values {
        if out.contains(value.as_str()) {
            out = out.replace(value.as_str(), REDACTION_MASK);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelType;

    fn http_log(url: &str, request_body: &str, response_body: &str) -> HttpLog {
        HttpLog {
            method: "POST".to_string(),
            url: url.to_string(),
            request_headers: vec![("Authorization".to_string(), "Bearer sesame".to_string())],
            request_body: request_body.to_string(),
            response_status: Some(200),
            response_headers: vec![],
            response_body: response_body.to_string(),
            elapsed_ms: 12,
        }
    }

    #[test]
    fn finalize_masks_every_trace_field() {
        let channel = Channel::new(Uuid::new_v4(), ChannelType::new("BL"), "2020", "KE");
        let mut log = ChannelLog::new(
            ChannelLogType::MsgSend,
            Some(&channel),
            vec!["sesame".to_string()],
        );
        log.add_http_log(http_log(
            "https://api.example.com/send?token=sesame",
            "token=sesame&to=123",
            "{\"token\":\"sesame\",\"ok\":true}",
        ));
        log.error(LogError::other("bad token sesame rejected"));

        log.finalize();

        let entry = &log.http_logs()[0];
        assert!(!entry.url.contains("sesame"));
        assert!(!entry.request_body.contains("sesame"));
        assert!(!entry.response_body.contains("sesame"));
        assert_eq!(entry.request_headers[0].1, format!("Bearer {REDACTION_MASK}"));
        assert!(!log.errors()[0].message.contains("sesame"));
        assert!(entry.url.contains(REDACTION_MASK));
    }

    #[test]
    fn redaction_applies_to_all_entries() {
        let mut log = ChannelLog::new(ChannelLogType::MsgSend, None, vec!["key42".to_string()]);
        log.add_http_log(http_log("https://a.example.com/?k=key42", "", ""));
        log.add_http_log(http_log("https://b.example.com/?k=key42", "", ""));
        log.finalize();
        for entry in log.http_logs() {
            assert!(!entry.url.contains("key42"));
        }
    }

    #[test]
    fn external_errors_carry_the_provider_code() {
        let error = LogError::external("45015", "response out of time limit");
        assert_eq!(error.code, "external");
        assert_eq!(error.ext_code.as_deref(), Some("45015"));

        let error = LogError::response_status(403);
        assert_eq!(error.ext_code, None);

        let error = LogError::other("no status in response").with_ext_code("");
        assert_eq!(error.ext_code, None);
    }

    #[test]
    fn empty_redact_values_leave_log_untouched() {
        let mut log = ChannelLog::new(ChannelLogType::MsgReceive, None, vec![]);
        log.add_http_log(http_log("https://example.com/receive", "from=123", "ok"));
        log.finalize();
        assert_eq!(log.http_logs()[0].request_body, "from=123");
    }
}
