//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the default filter.
///
/// Honors `RUST_LOG` when set; falls back to `servicekit=debug` otherwise.
/// Calling this more than once is an error in the caller; hosts that install
/// their own subscriber should simply skip it.
pub fn init() {
    init_with_default_filter("servicekit=debug,tower_http=debug");
}

/// Initialize the tracing subscriber with an explicit fallback filter.
pub fn init_with_default_filter(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
