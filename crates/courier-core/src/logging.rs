//! Logging bootstrap for the gateway process.
//!
//! `LOG_FORMAT=json` switches to flattened JSON for log aggregation; the
//! default is human-readable text for development. `RUST_LOG` filters as
//! usual; without it the gateway logs at info with the HTTP client and
//! server internals turned down, since every provider round trip is
//! already captured in the ChannelLog.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when RUST_LOG is unset: webhook and send-pool activity at
/// info, noisy transport internals at warn.
const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,reqwest=warn,h2=warn";

/// Initialize logging for the gateway process.
pub fn init_logging(service: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .init();
    }

    tracing::info!(service = service, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        let filter = EnvFilter::new(DEFAULT_DIRECTIVES);
        drop(filter);
    }
}
