use std::env;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "NATIVEDNN_LOG";
const DEFAULT_FILTER: &str = "warn";

static INIT: OnceLock<()> = OnceLock::new();

fn env_filter() -> EnvFilter {
    env::var(LOG_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a fmt subscriber filtered by `NATIVEDNN_LOG`.
///
/// Safe to call more than once; only the first call installs anything, and an
/// already-installed global subscriber (from the host application) is kept.
pub fn init() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .try_init();
    });
}
