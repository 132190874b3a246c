use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Config keys recognized across all handlers.
pub const CONFIG_AUTH_TOKEN: &str = "auth_token";
pub const CONFIG_API_KEY: &str = "api_key";
pub const CONFIG_SECRET: &str = "secret";
pub const CONFIG_USERNAME: &str = "username";
pub const CONFIG_PASSWORD: &str = "password";
pub const CONFIG_SEND_AUTHORIZATION: &str = "send_authorization";
pub const CONFIG_CALLBACK_DOMAIN: &str = "callback_domain";
pub const CONFIG_MAX_LENGTH: &str = "max_length";

/// Stable 2-4 character code identifying a channel type, e.g. "BL", "WC".
///
/// The code appears in webhook URL paths (lowercased) and is the registry
/// lookup key for the owning handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelType(String);

impl ChannelType {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used in URL paths.
    pub fn path_segment(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelType {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// A provider account binding belonging to a tenant.
///
/// Loaded on demand from the backend and cached in-process; immutable for
/// the duration of a request or send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    uuid: Uuid,
    channel_type: ChannelType,
    address: String,
    country: String,
    config: HashMap<String, serde_json::Value>,
}

impl Channel {
    pub fn new(
        uuid: Uuid,
        channel_type: ChannelType,
        address: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            uuid,
            channel_type,
            address: address.into(),
            country: country.into(),
            config: HashMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn channel_type(&self) -> &ChannelType {
        &self.channel_type
    }

    /// The provider-side address: short code, phone number, page id, app id.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// ISO-3166 alpha-2 country code, used for phone canonicalization.
    pub fn country(&self) -> &str {
        &self.country
    }

    /// A string config value; numbers are rendered, other shapes are None.
    pub fn config_str(&self, key: &str) -> Option<String> {
        match self.config.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn config_int(&self, key: &str) -> Option<i64> {
        match self.config.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn config_bool(&self, key: &str, default: bool) -> bool {
        match self.config.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true" || s == "T" || s == "1",
            _ => default,
        }
    }

    /// The domain provider-facing callback URLs are built against: the
    /// channel's own override when set, the server default otherwise.
    pub fn callback_domain(&self, server_default: &str) -> String {
        self.config_str(CONFIG_CALLBACK_DOMAIN)
            .unwrap_or_else(|| server_default.to_string())
    }

    /// Per-channel override of a handler's maximum message length.
    pub fn max_length(&self, default: usize) -> usize {
        self.config_int(CONFIG_MAX_LENGTH)
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(default)
    }

    /// String values of the given config keys, for log redaction.
    pub fn config_values_for(&self, keys: &[&str]) -> Vec<String> {
        keys.iter()
            .filter_map(|k| self.config_str(k))
            .filter(|v| !v.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_channel() -> Channel {
        Channel::new(Uuid::new_v4(), ChannelType::new("bl"), "2020", "KE")
            .with_config("username", json!("user1"))
            .with_config("password", json!("pass1"))
            .with_config("max_length", json!(140))
    }

    #[test]
    fn type_code_is_uppercased() {
        let ch = test_channel();
        assert_eq!(ch.channel_type().as_str(), "BL");
        assert_eq!(ch.channel_type().path_segment(), "bl");
    }

    #[test]
    fn config_access() {
        let ch = test_channel();
        assert_eq!(ch.config_str("username").as_deref(), Some("user1"));
        assert_eq!(ch.config_str("missing"), None);
        assert_eq!(ch.config_int("max_length"), Some(140));
        assert_eq!(ch.max_length(160), 140);
    }

    #[test]
    fn callback_domain_prefers_channel_override() {
        let ch = test_channel().with_config("callback_domain", json!("custom.example.com"));
        assert_eq!(ch.callback_domain("courier.example.com"), "custom.example.com");

        let ch = test_channel();
        assert_eq!(ch.callback_domain("courier.example.com"), "courier.example.com");
    }

    #[test]
    fn redact_values_skip_missing_keys() {
        let ch = test_channel();
        let values = ch.config_values_for(&["username", "password", "secret"]);
        assert_eq!(values, vec!["user1".to_string(), "pass1".to_string()]);
    }
}
