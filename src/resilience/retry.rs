// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Used by the informer to survive list and watch failures against the
//! notification source.
//!
//! # Example
//!
//! ```
//! use event_relay::RetryConfig;
//! use std::time::Duration;
//!
//! // Informer: never give up on the source
//! let watch = RetryConfig::watch();
//! assert_eq!(watch.max_retries, None);
//!
//! // Backoff doubles up to the cap
//! assert_eq!(watch.next_delay(Duration::from_millis(800)), Duration::from_millis(1600));
//! assert_eq!(watch.next_delay(Duration::from_secs(20)), Duration::from_secs(30));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff schedule for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// `None` retries forever
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::watch()
    }
}

impl RetryConfig {
    /// Infinite retry for list/watch against the notification source.
    /// Starts at 800ms and caps at 30 seconds.
    #[must_use]
    pub fn watch() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay following `current`, capped at `max_delay`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the configured attempts run out.
///
/// Returns the last error when giving up.
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
    let mut attempts = 0usize;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                match config.max_retries {
                    Some(max) if attempts >= max => return Err(err),
                    Some(max) => warn!(
                        operation = operation_name,
                        attempt = attempts,
                        max,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    ),
                    None => warn!(
                        operation = operation_name,
                        attempt = attempts,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Operation failed, will retry until stopped"
                    ),
                }

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
