//! Process-wide logging setup for embedders and tests.

use tracing_subscriber::EnvFilter;

/// Load `.env` and install the fmt subscriber with `RUST_LOG` filtering.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
