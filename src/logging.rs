//! Log setup shared by the command-line tools.

use tracing_subscriber::{fmt, EnvFilter};

/// Compact stderr logging. `RUST_LOG` wins over `default_level`; an
/// unparsable level falls back to `info`. Safe to call more than once.
pub fn init_logging(default_level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
