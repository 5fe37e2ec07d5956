//! Test configuration helpers.
//!
//! Centralizes the config values test modules would otherwise repeat.

use ferrodb_auth_types::AuthConfig;

/// Auth configuration suitable for tests.
///
/// Caching and background refresh are disabled so every read hits the
/// tables, and timeouts are short to keep failing tests fast.
#[must_use]
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        permissions_validity_in_ms: 0,
        permissions_update_interval_in_ms: 0,
        max_command_size: 1024 * 1024,
        proposal_timeout_ms: 2000,
        barrier_timeout_ms: 2000,
    }
}

/// Auth configuration with a deliberately tiny command size, forcing the
/// splitter to fan even small logical mutations out across commands.
#[must_use]
pub fn tiny_command_config(max_command_size: usize) -> AuthConfig {
    AuthConfig { max_command_size, ..test_auth_config() }
}

/// Auth configuration with caching enabled.
#[must_use]
pub fn cached_auth_config(validity_ms: u64, refresh_ms: u64) -> AuthConfig {
    AuthConfig {
        permissions_validity_in_ms: validity_ms,
        permissions_update_interval_in_ms: refresh_ms,
        ..test_auth_config()
    }
}
