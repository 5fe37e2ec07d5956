//! Shared test utilities for FerroDB Auth crates.
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`test_auth_config`] - Default auth configuration for tests
//! - [`tiny_command_config`] / [`cached_auth_config`] - Variants for the
//!   splitter and cache scenarios
//! - [`init_test_logging`] - Once-per-process tracing setup

#![deny(unsafe_code)]

mod assertions;
pub use assertions::assert_eventually;

mod config;
pub use config::{cached_auth_config, test_auth_config, tiny_command_config};

mod logging;
pub use logging::init_test_logging;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_assert_eventually_immediate_success() {
        assert!(assert_eventually(Duration::from_millis(100), || true).await);
    }

    #[tokio::test]
    async fn test_assert_eventually_delayed_success() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flag_clone.store(true, Ordering::SeqCst);
        });
        assert!(
            assert_eventually(Duration::from_millis(500), || flag.load(Ordering::SeqCst))
                .await
        );
    }

    #[tokio::test]
    async fn test_assert_eventually_timeout() {
        assert!(!assert_eventually(Duration::from_millis(50), || false).await);
    }

    #[test]
    fn test_configs_validate() {
        test_auth_config().validate().unwrap();
        tiny_command_config(64).validate().unwrap();
        cached_auth_config(1000, 100).validate().unwrap();
    }
}
