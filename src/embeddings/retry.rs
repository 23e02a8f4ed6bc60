use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::{RagError, Result};

/// Retry-with-backoff policy for provider calls.
///
/// On 0-indexed failed attempt `i`, sleeps `base_delay^i` seconds before the
/// next attempt; after the final attempt fails, the last error is returned to
/// the caller. Applied uniformly to single and batch embedding requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_secs: f64,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    #[inline]
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_secs: config.base_delay_secs,
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match op() {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", what, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        what,
                        attempt + 1,
                        self.max_retries,
                        error
                    );

                    if attempt + 1 < self.max_retries {
                        let delay = self.delay_for_attempt(attempt);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }

                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RagError::Embedding(format!("{what} failed after retries"))))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::from_secs_f64(self.base_delay_secs.powi(attempt))
    }
}
