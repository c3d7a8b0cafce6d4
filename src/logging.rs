//! Optional `tracing-subscriber` bootstrap for binaries embedding this
//! client. A library shouldn't install a global subscriber on its own, so
//! nothing here runs unless the caller invokes it.

use time::UtcOffset;
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

/// Installs a `tracing` subscriber with a sensible default filter, honoring
/// `RUST_LOG` when set. Call once, near the start of `main`.
pub fn init_tracing(default_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_timer(timer)
        .with_filter(env_filter);

    Registry::default().with(layer).try_init()
}
