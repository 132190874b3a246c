//! Shared outbound HTTP clients with automatic channel-log tracing.
//!
//! Two clients are built once and shared across all handlers: one with
//! normal TLS verification and one accepting invalid certificates for the
//! handful of providers with broken chains. Every request is recorded into
//! the current ChannelLog before classification happens.

use bytes::Bytes;
use reqwest::{Client, Request, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

use courier_core::{ChannelLog, HttpLog, SendError};

use crate::request::MAX_BODY_BYTES;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of a traced provider response, ready for classification.
#[derive(Debug, Clone)]
pub struct TraceResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl TraceResponse {
    /// 5xx means the provider itself is unwell and the send may be retried;
    /// any other non-2xx is a definitive rejection of this request.
    pub fn require_success(&self) -> Result<(), SendError> {
        if self.status >= 500 {
            return Err(SendError::ConnectionFailed);
        }
        if !(200..300).contains(&self.status) {
            return Err(SendError::ResponseStatus(self.status));
        }
        Ok(())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON; a shape mismatch is a provider contract
    /// violation, not a connection problem.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SendError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| SendError::ResponseUnexpected(e.to_string()))
    }
}

/// The shared client pair.
pub struct HttpxClient {
    secure: Client,
    insecure: Client,
    user_agent: String,
}

impl HttpxClient {
    pub fn new(version: &str, allow_insecure: bool) -> Self {
        let user_agent = format!("Courier/{version}");

        let secure = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        let insecure = if allow_insecure {
            Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(CONNECT_TIMEOUT)
                .danger_accept_invalid_certs(true)
                .build()
                .expect("failed to build insecure HTTP client")
        } else {
            secure.clone()
        };

        Self {
            secure,
            insecure,
            user_agent,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Request builder on the verified client with the standard User-Agent.
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.secure.get(url).header("User-Agent", &self.user_agent)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.secure.post(url).header("User-Agent", &self.user_agent)
    }

    /// Executes a built request on the verified client, tracing it into the
    /// log. Transport failures return [`SendError::ConnectionFailed`].
    pub async fn send(
        &self,
        builder: RequestBuilder,
        log: &mut ChannelLog,
    ) -> Result<TraceResponse, SendError> {
        let request = builder
            .build()
            .map_err(|e| SendError::Other(format!("invalid request: {e}")))?;
        self.execute(&self.secure, request, log).await
    }

    /// Same as [`HttpxClient::send`] but on the TLS-insecure client.
    pub async fn send_insecure(
        &self,
        builder: RequestBuilder,
        log: &mut ChannelLog,
    ) -> Result<TraceResponse, SendError> {
        let request = builder
            .build()
            .map_err(|e| SendError::Other(format!("invalid request: {e}")))?;
        self.execute(&self.insecure, request, log).await
    }

    async fn execute(
        &self,
        client: &Client,
        request: Request,
        log: &mut ChannelLog,
    ) -> Result<TraceResponse, SendError> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let request_headers = header_pairs(request.headers());
        let request_body = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();

        let started = Instant::now();
        let response = match client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                log.add_http_log(HttpLog {
                    method,
                    url: url.clone(),
                    request_headers,
                    request_body,
                    response_status: None,
                    response_headers: Vec::new(),
                    response_body: String::new(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
                debug!(url = %url, error = %e, "provider request failed");
                return Err(SendError::ConnectionFailed);
            }
        };

        let status = response.status().as_u16();
        let response_headers = header_pairs(response.headers());
        let mut body = response
            .bytes()
            .await
            .unwrap_or_default();
        body.truncate(MAX_BODY_BYTES);

        log.add_http_log(HttpLog {
            method,
            url,
            request_headers,
            request_body,
            response_status: Some(status),
            response_headers: response_headers.clone(),
            response_body: String::from_utf8_lossy(&body).into_owned(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        Ok(TraceResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(status: u16) -> TraceResponse {
        TraceResponse {
            status,
            headers: vec![],
            body: Bytes::new(),
        }
    }

    #[test]
    fn status_classification() {
        assert!(trace(200).require_success().is_ok());
        assert!(trace(201).require_success().is_ok());
        assert!(matches!(
            trace(403).require_success(),
            Err(SendError::ResponseStatus(403))
        ));
        assert!(matches!(
            trace(500).require_success(),
            Err(SendError::ConnectionFailed)
        ));
        assert!(matches!(
            trace(503).require_success(),
            Err(SendError::ConnectionFailed)
        ));
    }
}
