//! Process-wide adapter registry.
//!
//! Composed once at startup from each handler's registration hook, then
//! read-only for the life of the process.

use std::collections::HashMap;
use tracing::info;

use crate::handler::SharedHandler;

#[derive(Default)]
pub struct AdapterRegistry {
    handlers: HashMap<String, SharedHandler>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its channel type code.
    ///
    /// # Panics
    ///
    /// Panics when two handlers claim the same code; that is a programming
    /// error caught at startup, never at request time.
    pub fn register(&mut self, handler: SharedHandler) {
        let code = handler.channel_type().as_str().to_string();
        info!(channel_type = %code, name = handler.channel_name(), "registering channel handler");
        if self.handlers.insert(code.clone(), handler).is_some() {
            panic!("duplicate channel handler registered for type {code}");
        }
    }

    /// Looks up a handler by type code, case-insensitively.
    pub fn get(&self, code: &str) -> Option<&SharedHandler> {
        self.handlers.get(&code.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedHandler> {
        self.handlers.values()
    }
}
