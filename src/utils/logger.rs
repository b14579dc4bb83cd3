// Logger initialization
// RUST_LOG overrides the default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "gchatter=debug,tower_http=debug,axum=debug";

pub fn init_logger() {
    init_with_default(DEFAULT_FILTER);
}

/// Console sessions log to stderr at a quieter level so the transcript stays readable.
pub fn init_console_logger() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gchatter=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_with_default(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
