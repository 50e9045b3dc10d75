//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber for a batch process.
///
/// The filter comes from `RUST_LOG` when set, otherwise `default_level`
/// (for example `"info"` or `"batchflow=debug"`). With `json` set, events are
/// written as one JSON object per line.
///
/// Safe to call more than once: only the first call installs a subscriber.
/// Returns `true` if this call installed it.
pub fn init_tracing(default_level: &str, json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}
