//! Configuration for the tag manager service.

use std::env;
use std::time::Duration;

use crate::client::CLICKUP_API_URL;
use crate::retry::RetryPolicy;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// `ClickUp` API base URL.
    pub api_url: String,
    /// Retry settings for upstream calls.
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: env_parse("TAG_MANAGER_PORT").unwrap_or(8080),
            api_url: env::var("CLICKUP_API_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| CLICKUP_API_URL.to_string()),
            retry: RetryConfig::default(),
        }
    }
}

/// Per-call-site retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Deadline for each upstream attempt.
    pub timeout: Duration,
    /// Linear backoff unit.
    pub base_delay: Duration,
    /// Attempts for workspace traversal fetches.
    pub traversal_max_attempts: u32,
    /// Attempts for task reads and tag updates during mutations.
    pub update_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(env_parse("CLICKUP_TIMEOUT_MS").unwrap_or(10_000)),
            base_delay: Duration::from_millis(
                env_parse("CLICKUP_RETRY_BASE_DELAY_MS").unwrap_or(500),
            ),
            traversal_max_attempts: env_parse("CLICKUP_TRAVERSAL_MAX_ATTEMPTS").unwrap_or(3),
            update_max_attempts: env_parse("CLICKUP_UPDATE_MAX_ATTEMPTS").unwrap_or(2),
        }
    }
}

impl RetryConfig {
    /// Policy for traversal fetches.
    #[must_use]
    pub fn traversal(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.traversal_max_attempts,
            timeout: self.timeout,
            base_delay: self.base_delay,
        }
    }

    /// Policy for task reads and updates.
    #[must_use]
    pub fn update(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.update_max_attempts,
            timeout: self.timeout,
            base_delay: self.base_delay,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
