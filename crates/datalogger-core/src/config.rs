//! Logger configuration and its provisioning blob
//!
//! The configuration is provisioned as a postcard-encoded [`LoggerConfig`].
//! Defaults match the deployed firmware: a 30 °C pivot with no hysteresis,
//! 20 minute wakes while active and hourly wakes while inactive.

use alloc::vec::Vec;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::storage::{DEFAULT_DIE_SIZE, WriteFailurePolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not decode config blob: {0}")]
    Decode(postcard::Error),
    #[error("could not encode config: {0}")]
    Encode(postcard::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerConfig {
    /// `128 × raw` above this switches to active
    pub activity_threshold: i32,
    /// `128 × raw` at or below this switches to inactive
    pub inactivity_threshold: i32,
    /// Inactivity interrupts needed before the duty cycle flips
    pub inactivity_debounce: u8,
    pub active_wake_secs: u32,
    pub inactive_wake_secs: u32,
    /// Attempt budget for one sensor transaction
    pub bus_retry_attempts: u8,
    /// Seconds after which a failing sensor transaction stops retrying
    pub bus_deadline_secs: u32,
    /// Program/verify attempts per flash byte
    pub flash_write_attempts: u8,
    /// Bytes per flash die
    pub die_size: u32,
    pub write_failure_policy: WriteFailurePolicy,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            activity_threshold: 30,
            inactivity_threshold: 30,
            inactivity_debounce: 3,
            active_wake_secs: 20 * 60,
            inactive_wake_secs: 60 * 60,
            bus_retry_attempts: 8,
            bus_deadline_secs: 2,
            flash_write_attempts: 3,
            die_size: DEFAULT_DIE_SIZE,
            write_failure_policy: WriteFailurePolicy::Continue,
        }
    }
}

impl LoggerConfig {
    /// Decode and validate a provisioning blob
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(ConfigError::Encode)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.die_size == 0 {
            return Err(ConfigError::Invalid("die size must be non-zero"));
        }
        if self.bus_retry_attempts == 0 || self.flash_write_attempts == 0 {
            return Err(ConfigError::Invalid("attempt budgets must be at least 1"));
        }
        if self.inactivity_debounce == 0 {
            return Err(ConfigError::Invalid("inactivity debounce must be at least 1"));
        }
        if self.inactivity_threshold > self.activity_threshold {
            return Err(ConfigError::Invalid(
                "inactivity threshold is above the activity threshold",
            ));
        }
        if self.active_wake_secs == 0 || self.inactive_wake_secs == 0 {
            return Err(ConfigError::Invalid("wake intervals must be non-zero"));
        }
        Ok(())
    }

    pub const fn active_wake(&self) -> Duration {
        Duration::from_secs(self.active_wake_secs as u64)
    }

    pub const fn inactive_wake(&self) -> Duration {
        Duration::from_secs(self.inactive_wake_secs as u64)
    }
}
