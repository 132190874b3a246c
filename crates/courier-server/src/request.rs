//! Bounded webhook request buffering and decoding.
//!
//! The router reads at most 1 MiB of body once; handlers re-read the same
//! buffer for decoding and signature verification, never the raw stream.

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::ReceiveError;

/// Maximum webhook body size read into memory.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Declarative payload validation run after decoding. Implementations check
/// required fields and format constraints; failures answer 400.
pub trait Validate {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// One buffered inbound webhook request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl WebhookRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The buffered body bytes, re-readable any number of times.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    /// Decodes url-encoded parameters from the body (POST) or the query
    /// string (GET), then validates.
    pub fn form<T: DeserializeOwned + Validate>(&self) -> Result<T, ReceiveError> {
        let raw = if self.body.is_empty() {
            self.query().as_bytes()
        } else {
            &self.body
        };
        let value: T = serde_urlencoded::from_bytes(raw)
            .map_err(|e| ReceiveError::Decode(e.to_string()))?;
        value.validate().map_err(ReceiveError::Validation)?;
        Ok(value)
    }

    /// Decodes the body as JSON, then validates.
    pub fn json<T: DeserializeOwned + Validate>(&self) -> Result<T, ReceiveError> {
        let value: T =
            serde_json::from_slice(&self.body).map_err(|e| ReceiveError::Decode(e.to_string()))?;
        value.validate().map_err(ReceiveError::Validation)?;
        Ok(value)
    }

    /// Decodes the body as XML, then validates.
    pub fn xml<T: DeserializeOwned + Validate>(&self) -> Result<T, ReceiveError> {
        let value: T = quick_xml::de::from_reader(self.body.as_ref())
            .map_err(|e| ReceiveError::Decode(e.to_string()))?;
        value.validate().map_err(ReceiveError::Validation)?;
        Ok(value)
    }

    /// Form or query parameters as a plain map, for handlers that inspect
    /// fields dynamically.
    pub fn params(&self) -> HashMap<String, String> {
        let raw = if self.body.is_empty() {
            self.query().as_bytes()
        } else {
            &self.body
        };
        serde_urlencoded::from_bytes(raw).unwrap_or_default()
    }

    /// Query parameters only, regardless of body presence.
    pub fn query_params(&self) -> HashMap<String, String> {
        serde_urlencoded::from_str(self.query()).unwrap_or_default()
    }
}

/// Returns the value of a required field or a validation error naming it.
pub fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ReceiveError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ReceiveError::Validation(format!(
            "missing required field: {field}"
        ))),
    }
}
