//! Shared helpers for the integration suite.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the test tracing subscriber once per process.
///
/// Run with `RUST_LOG=lockwire=debug` to watch the negotiation.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
