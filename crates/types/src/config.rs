//! Runtime configuration for the auth subsystem.
//!
//! Recognized options follow the original system's names: cache validity and
//! refresh are millisecond integers where `0` disables the behavior, and
//! `max_command_size` bounds the serialized size of a single group-zero
//! command.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use snafu::Snafu;

/// Error produced when configuration validation fails.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A value is out of range or violates a cross-field constraint.
    #[snafu(display("Invalid configuration: {message}"))]
    Validation {
        /// Description of the violated constraint.
        message: String,
    },
}

/// Auth subsystem configuration.
///
/// # Validation Rules
///
/// - `max_command_size` must be > 0
/// - `proposal_timeout_ms` and `barrier_timeout_ms` must be >= 1
/// - when both cache options are non-zero, `permissions_update_interval_in_ms`
///   must be <= `permissions_validity_in_ms` (refreshing less often than
///   entries live would serve only expired entries)
///
/// # Example
///
/// ```
/// use ferrodb_auth_types::AuthConfig;
///
/// let config = AuthConfig::builder()
///     .permissions_validity_in_ms(0) // disable caching for strict tests
///     .max_command_size(4096)
///     .build()
///     .expect("valid auth config");
/// assert!(config.permissions_validity().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long a cached permissions entry stays valid, in milliseconds.
    /// `0` disables caching entirely: every lookup reads the local tables.
    #[serde(default = "default_permissions_validity_in_ms")]
    pub permissions_validity_in_ms: u64,
    /// Background cache refresh interval, in milliseconds.
    /// `0` disables background refresh.
    #[serde(default = "default_permissions_update_interval_in_ms")]
    pub permissions_update_interval_in_ms: u64,
    /// Maximum serialized size of one consensus command, in bytes.
    /// Larger logical mutations are split.
    #[serde(default = "default_max_command_size")]
    pub max_command_size: usize,
    /// Maximum time to wait for one proposal to commit, in milliseconds.
    #[serde(default = "default_proposal_timeout_ms")]
    pub proposal_timeout_ms: u64,
    /// Default read-barrier deadline, in milliseconds.
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            permissions_validity_in_ms: default_permissions_validity_in_ms(),
            permissions_update_interval_in_ms: default_permissions_update_interval_in_ms(),
            max_command_size: default_max_command_size(),
            proposal_timeout_ms: default_proposal_timeout_ms(),
            barrier_timeout_ms: default_barrier_timeout_ms(),
        }
    }
}

#[bon::bon]
impl AuthConfig {
    /// Creates a new auth configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range or a
    /// cross-field constraint is violated.
    #[builder]
    pub fn new(
        #[builder(default = default_permissions_validity_in_ms())]
        permissions_validity_in_ms: u64,
        #[builder(default = default_permissions_update_interval_in_ms())]
        permissions_update_interval_in_ms: u64,
        #[builder(default = default_max_command_size())] max_command_size: usize,
        #[builder(default = default_proposal_timeout_ms())] proposal_timeout_ms: u64,
        #[builder(default = default_barrier_timeout_ms())] barrier_timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            permissions_validity_in_ms,
            permissions_update_interval_in_ms,
            max_command_size,
            proposal_timeout_ms,
            barrier_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AuthConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_command_size == 0 {
            return Err(ConfigError::Validation {
                message: "max_command_size must be > 0".to_string(),
            });
        }
        if self.proposal_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                message: "proposal_timeout_ms must be >= 1".to_string(),
            });
        }
        if self.barrier_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                message: "barrier_timeout_ms must be >= 1".to_string(),
            });
        }
        if self.permissions_validity_in_ms != 0
            && self.permissions_update_interval_in_ms != 0
            && self.permissions_update_interval_in_ms > self.permissions_validity_in_ms
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "permissions_update_interval_in_ms ({}) must be <= permissions_validity_in_ms ({})",
                    self.permissions_update_interval_in_ms, self.permissions_validity_in_ms
                ),
            });
        }
        Ok(())
    }

    /// Cache entry validity, or `None` when caching is disabled.
    #[must_use]
    pub fn permissions_validity(&self) -> Option<Duration> {
        (self.permissions_validity_in_ms > 0)
            .then(|| Duration::from_millis(self.permissions_validity_in_ms))
    }

    /// Background refresh interval, or `None` when refresh is disabled.
    #[must_use]
    pub fn permissions_update_interval(&self) -> Option<Duration> {
        (self.permissions_update_interval_in_ms > 0)
            .then(|| Duration::from_millis(self.permissions_update_interval_in_ms))
    }

    /// Per-proposal commit deadline.
    #[must_use]
    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    /// Default read-barrier deadline.
    #[must_use]
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }
}

fn default_permissions_validity_in_ms() -> u64 {
    2000
}

fn default_permissions_update_interval_in_ms() -> u64 {
    2000
}

fn default_max_command_size() -> usize {
    1024 * 1024
}

fn default_proposal_timeout_ms() -> u64 {
    5000
}

fn default_barrier_timeout_ms() -> u64 {
    5000
}
