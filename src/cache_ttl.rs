//! Centralized cache tuning per resource
//!
//! Stale time, garbage-collection time and retry count for each cached
//! resource, with environment variable overrides.

use crate::cache_key::resources;
use std::env;
use std::time::Duration;

// Default tuning constants (in seconds)
pub const STALE_SECONDS_DEFAULT: u64 = 30;
pub const GC_SECONDS_DEFAULT: u64 = 300; // 5 minutes
pub const RETRY_DEFAULT: u32 = 1;
pub const RETRY_DELAY_MS_DEFAULT: u64 = 1000;

pub const STALE_SECONDS_LOGS: u64 = 10; // logs move fast
pub const STALE_SECONDS_USERS: u64 = 60;
pub const STALE_SECONDS_ACCOUNT: u64 = 300; // 5 minutes
pub const STALE_SECONDS_PERMISSION_REQUESTS: u64 = 30;
pub const STALE_SECONDS_HEALTH: u64 = 15;

pub const GC_SECONDS_ACCOUNT: u64 = 1800; // 30 minutes

/// Longest wait between two fetch attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age after which a cached result is refetched on next read.
    pub stale_time: Duration,
    /// Idle time after which an entry is evicted.
    pub gc_time: Duration,
    /// Extra attempts after the first failure.
    pub retry: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_delay: Duration,
}

impl QueryOptions {
    pub fn new(stale_seconds: u64, gc_seconds: u64, retry: u32) -> Self {
        Self {
            stale_time: Duration::from_secs(stale_seconds),
            gc_time: Duration::from_secs(gc_seconds),
            retry,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS_DEFAULT),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Backoff before attempt `attempt` (1-based retry number).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new(STALE_SECONDS_DEFAULT, GC_SECONDS_DEFAULT, RETRY_DEFAULT)
    }
}

/// Get a numeric value with environment variable override
pub fn value_with_env<T: std::str::FromStr + Copy>(env_key: &str, default: T) -> T {
    env::var(env_key)
        .map(|val| val.parse::<T>().unwrap_or(default))
        .unwrap_or(default)
}

/// Resource options from `QUERY_<RESOURCE>_{STALE_SECONDS,GC_SECONDS,RETRY}`
pub fn options_from_env(resource_env: &str, defaults: QueryOptions) -> QueryOptions {
    QueryOptions {
        stale_time: Duration::from_secs(value_with_env(
            &format!("QUERY_{}_STALE_SECONDS", resource_env),
            defaults.stale_time.as_secs(),
        )),
        gc_time: Duration::from_secs(value_with_env(
            &format!("QUERY_{}_GC_SECONDS", resource_env),
            defaults.gc_time.as_secs(),
        )),
        retry: value_with_env(&format!("QUERY_{}_RETRY", resource_env), defaults.retry),
        retry_delay: defaults.retry_delay,
    }
}

/// Per-resource cache tuning, injected into every service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfigs {
    pub default: QueryOptions,
    pub logs: QueryOptions,
    pub users: QueryOptions,
    pub account: QueryOptions,
    pub permission_requests: QueryOptions,
    pub health: QueryOptions,
}

impl QueryConfigs {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default: options_from_env("DEFAULT", defaults.default),
            logs: options_from_env("LOGS", defaults.logs),
            users: options_from_env("USERS", defaults.users),
            account: options_from_env("ACCOUNT", defaults.account),
            permission_requests: options_from_env(
                "PERMISSION_REQUESTS",
                defaults.permission_requests,
            ),
            health: options_from_env("HEALTH", defaults.health),
        }
    }

    /// Same tuning for every resource; handy in tests.
    pub fn uniform(options: QueryOptions) -> Self {
        Self {
            default: options,
            logs: options,
            users: options,
            account: options,
            permission_requests: options,
            health: options,
        }
    }

    pub fn for_resource(&self, resource: &str) -> QueryOptions {
        match resource {
            resources::LOGS => self.logs,
            resources::USERS => self.users,
            resources::ACCOUNT => self.account,
            resources::PERMISSION_REQUESTS => self.permission_requests,
            resources::HEALTH => self.health,
            _ => self.default,
        }
    }
}

impl Default for QueryConfigs {
    fn default() -> Self {
        Self {
            default: QueryOptions::default(),
            logs: QueryOptions::new(STALE_SECONDS_LOGS, GC_SECONDS_DEFAULT, RETRY_DEFAULT),
            users: QueryOptions::new(STALE_SECONDS_USERS, GC_SECONDS_DEFAULT, RETRY_DEFAULT),
            account: QueryOptions::new(STALE_SECONDS_ACCOUNT, GC_SECONDS_ACCOUNT, RETRY_DEFAULT),
            permission_requests: QueryOptions::new(
                STALE_SECONDS_PERMISSION_REQUESTS,
                GC_SECONDS_DEFAULT,
                RETRY_DEFAULT,
            ),
            health: QueryOptions::new(STALE_SECONDS_HEALTH, GC_SECONDS_DEFAULT, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let options = QueryOptions::default().with_retry_delay(Duration::from_millis(500));
        assert_eq!(options.backoff(1), Duration::from_millis(500));
        assert_eq!(options.backoff(2), Duration::from_millis(1000));
        assert_eq!(options.backoff(3), Duration::from_millis(2000));
        assert_eq!(options.backoff(20), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_resource_lookup_falls_back_to_default() {
        let configs = QueryConfigs::default();
        assert_eq!(configs.for_resource("logs").stale_time, Duration::from_secs(STALE_SECONDS_LOGS));
        assert_eq!(configs.for_resource("account").gc_time, Duration::from_secs(GC_SECONDS_ACCOUNT));
        assert_eq!(configs.for_resource("unknown"), QueryOptions::default());
    }

    #[test]
    fn test_env_override() {
        env::set_var("QUERY_TESTRES_STALE_SECONDS", "99");
        env::set_var("QUERY_TESTRES_RETRY", "not-a-number");
        let options = options_from_env("TESTRES", QueryOptions::default());
        assert_eq!(options.stale_time, Duration::from_secs(99));
        assert_eq!(options.retry, RETRY_DEFAULT);
        env::remove_var("QUERY_TESTRES_STALE_SECONDS");
        env::remove_var("QUERY_TESTRES_RETRY");
    }
}
