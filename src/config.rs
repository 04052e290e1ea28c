// Copyright (c) 2025 - Cowboy AI, Inc.
//! Catch-up dispatcher configuration

use std::time::Duration;

use crate::errors::{EventSourcingError, EventSourcingResult};

/// Environment variable overriding [`DispatcherConfig::poll_interval`] (milliseconds)
pub const ENV_POLL_INTERVAL_MS: &str = "CIM_DISPATCH_POLL_INTERVAL_MS";
/// Environment variable overriding [`DispatcherConfig::max_events_per_pass`]
pub const ENV_MAX_EVENTS: &str = "CIM_DISPATCH_MAX_EVENTS";
/// Environment variable overriding [`DispatcherConfig::max_group_size`]
pub const ENV_MAX_GROUP_SIZE: &str = "CIM_DISPATCH_MAX_GROUP_SIZE";
/// Environment variable overriding [`DispatcherConfig::default_wait_timeout`] (milliseconds)
pub const ENV_WAIT_TIMEOUT_MS: &str = "CIM_DISPATCH_WAIT_TIMEOUT_MS";

/// Configuration for the catch-up loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// How long the loop sleeps when there is nothing new and no signal arrives
    pub poll_interval: Duration,

    /// Maximum events streamed from the store per pass
    pub max_events_per_pass: usize,

    /// Group size used when the store does not report batch ids
    pub max_group_size: usize,

    /// Timeout used by waits that do not pass their own
    pub default_wait_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_events_per_pass: 1000,
            max_group_size: 100,
            default_wait_timeout: Duration::from_secs(10),
        }
    }
}

impl DispatcherConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_events_per_pass(mut self, max_events_per_pass: usize) -> Self {
        self.max_events_per_pass = max_events_per_pass;
        self
    }

    pub fn with_max_group_size(mut self, max_group_size: usize) -> Self {
        self.max_group_size = max_group_size;
        self
    }

    pub fn with_default_wait_timeout(mut self, default_wait_timeout: Duration) -> Self {
        self.default_wait_timeout = default_wait_timeout;
        self
    }

    /// Defaults overridden by `CIM_DISPATCH_*` environment variables
    pub fn from_env() -> EventSourcingResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> EventSourcingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(millis) = parse_positive(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval = Duration::from_millis(millis);
        }
        if let Some(count) = parse_positive(&lookup, ENV_MAX_EVENTS)? {
            config.max_events_per_pass = count as usize;
        }
        if let Some(count) = parse_positive(&lookup, ENV_MAX_GROUP_SIZE)? {
            config.max_group_size = count as usize;
        }
        if let Some(millis) = parse_positive(&lookup, ENV_WAIT_TIMEOUT_MS)? {
            config.default_wait_timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EventSourcingResult<()> {
        if self.max_events_per_pass == 0 {
            return Err(EventSourcingError::Configuration(
                "max_events_per_pass must be at least 1".to_string(),
            ));
        }
        if self.max_group_size == 0 {
            return Err(EventSourcingError::Configuration(
                "max_group_size must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(EventSourcingError::Configuration(
                "poll_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> EventSourcingResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => Err(EventSourcingError::Configuration(format!(
            "{} must be greater than zero",
            key
        ))),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(EventSourcingError::Configuration(format!(
            "{}='{}' is not a number: {}",
            key, raw, e
        ))),
    }
}
