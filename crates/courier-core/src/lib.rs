//! Core domain types for the Courier messaging gateway.
//!
//! Everything that flows between the inbound router, the send worker pool,
//! the provider handlers and the backend lives here:
//! - Channel: a tenant-owned binding of a provider account
//! - Urn: contact endpoint addressing with strict phone canonicalization
//! - MsgIn / MsgOut: inbound and outbound message objects
//! - StatusUpdate / ChannelEvent: lifecycle and contact events
//! - ChannelLog: per-operation HTTP trace with secret redaction
//! - SendError: the closed error set the worker pool classifies on

pub mod channel;
pub mod error;
pub mod event;
pub mod log;
pub mod logging;
pub mod msg;
pub mod status;
pub mod urn;

pub use channel::{Channel, ChannelType};
pub use error::SendError;
pub use event::{ChannelEvent, ChannelEventType};
pub use log::{ChannelLog, ChannelLogType, HttpLog, LogError, REDACTION_MASK};
pub use msg::{MsgIn, MsgOut, OptInRef, SendResult};
pub use status::{MsgRef, MsgStatus, StatusUpdate};
pub use urn::{calling_code, Scheme, Urn, UrnError};
