//! Shared test-harness bits.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber once per test binary, so the
/// `tracing::debug!`/`warn!` calls the containers make under test runs
/// actually reach an output sink instead of being dropped by the default
/// no-op subscriber. Controlled by `RUST_LOG`, same as any other
/// `tracing-subscriber` consumer; defaults to `warn` if unset.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
