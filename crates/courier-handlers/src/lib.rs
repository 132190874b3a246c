//! Provider adapters.
//!
//! Each module implements [`courier_server::ChannelHandler`] for one
//! provider protocol. [`register_handlers`] composes them into the
//! process-wide registry at startup.

use std::sync::Arc;

use courier_server::AdapterRegistry;

pub mod bongolive;
pub mod clicksend;
pub mod facebook;
pub mod infobip;
pub mod kannel;
pub mod smscentral;
pub mod telegram;
pub mod wechat;
pub mod yo;

#[cfg(test)]
mod testkit;

/// Registers every shipped handler.
pub fn register_handlers(registry: &mut AdapterRegistry) {
    registry.register(Arc::new(bongolive::BongoLiveHandler));
    registry.register(Arc::new(clicksend::ClickSendHandler));
    registry.register(Arc::new(facebook::FacebookHandler));
    registry.register(Arc::new(infobip::InfobipHandler));
    registry.register(Arc::new(kannel::KannelHandler));
    registry.register(Arc::new(smscentral::SmsCentralHandler));
    registry.register(Arc::new(telegram::TelegramHandler));
    registry.register(Arc::new(wechat::WeChatHandler));
    registry.register(Arc::new(yo::YoHandler));
}
