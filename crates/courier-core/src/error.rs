use thiserror::Error;

/// The closed set of errors a handler's `send` may return.
///
/// The send worker pool classifies on these variants to pick the final
/// message status; anything outside the set must be wrapped in `Other`.
#[derive(Debug, Error)]
pub enum SendError {
    /// A config value the handler requires is absent. Terminal: the message
    /// fails and will not be retried until the channel is fixed.
    #[error("missing channel config value: {0}")]
    ChannelConfig(&'static str),

    /// Transport failure or a 5xx from the provider. The only variant that
    /// is a retry hint to the backend.
    #[error("connection to provider failed")]
    ConnectionFailed,

    /// Provider answered with a non-2xx (and non-5xx) HTTP status.
    #[error("provider returned unexpected status {0}")]
    ResponseStatus(u16),

    /// HTTP status was fine but the provider payload signals failure.
    #[error("provider response indicates failure: {0}")]
    ResponseContent(String),

    /// Provider payload did not have the documented shape.
    #[error("provider response not in expected shape: {0}")]
    ResponseUnexpected(String),

    /// Provider reports the contact is blacklisted or opted out.
    #[error("contact has stopped or is blacklisted")]
    ContactStopped,

    #[error("{0}")]
    Other(String),
}

impl SendError {
    /// True when the backend may retry the message later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::ConnectionFailed)
    }
}
