// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Publish and subscribe traffic use the same loop: attempt, sleep for the
//! current backoff, multiply the backoff, try again until the attempt budget
//! is spent. Sleeps are awaited inline, so the caller's task is held for the
//! whole sequence.
//!
//! # Example
//!
//! ```
//! use cachewire::RetryConfig;
//! use cachewire::config::PubSubConfig;
//!
//! let pubsub = PubSubConfig::default();
//! let publish = RetryConfig::publish(&pubsub);
//! assert_eq!(publish.max_attempts, Some(3));
//!
//! // Daemon: never give up on reconnection
//! let daemon = RetryConfig::daemon();
//! assert_eq!(daemon.max_attempts, None);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::PubSubConfig;

/// Configuration for connection/operation retry behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryConfig::startup()`] - Fast-fail for initial connections
/// - [`RetryConfig::daemon()`] - Infinite retry for runtime reconnection
/// - [`RetryConfig::publish()`] - Publish transport retry from config
/// - [`RetryConfig::handler()`] - Subscriber handler retry from config
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first one. `None` retries forever.
    pub max_attempts: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::daemon()
    }
}

impl RetryConfig {
    /// Fast-fail retry for initial startup connection.
    /// Attempts 5 times with exponential backoff, failing after ~5 seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Infinite retry for long-running listeners (never give up!).
    /// Retries forever with exponential backoff capped at 5 minutes.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            factor: 2.0,
        }
    }

    /// Publish transport retry, driven by `pubsub.publish_*` settings.
    #[must_use]
    pub fn publish(config: &PubSubConfig) -> Self {
        Self::bounded(
            config.publish_max_attempts,
            config.publish_backoff_ms,
            config.publish_backoff_multiplier,
            config.max_backoff_ms,
        )
    }

    /// Subscriber handler retry, driven by `pubsub.handler_*` settings.
    #[must_use]
    pub fn handler(config: &PubSubConfig) -> Self {
        Self::bounded(
            config.handler_max_attempts,
            config.handler_backoff_ms,
            config.handler_backoff_multiplier,
            config.max_backoff_ms,
        )
    }

    /// Attempts floored at 1, multiplier floored at 1.0.
    fn bounded(max_attempts: u32, backoff_ms: u64, multiplier: f64, max_backoff_ms: u64) -> Self {
        let factor = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        Self {
            max_attempts: Some(max_attempts.max(1) as usize),
            initial_delay: Duration::from_millis(backoff_ms),
            max_delay: Duration::from_millis(max_backoff_ms.max(backoff_ms)),
            factor,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Backoff to use after a sleep of `delay`.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                match config.max_attempts {
                    Some(max) if attempts >= max => return Err(err),
                    Some(max) => warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max, err, delay
                    ),
                    None => warn!(
                        "Operation '{}' failed (attempt {}, will retry forever): {}. Next retry in {:?}...",
                        operation_name, attempts, err, delay
                    ),
                }

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
