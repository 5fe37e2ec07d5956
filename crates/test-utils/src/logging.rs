//! Tracing setup for tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes a tracing subscriber for tests, once per process.
///
/// Honors `RUST_LOG`; defaults to `warn` so passing tests stay quiet.
/// Output goes through the test writer, so it is captured per test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
