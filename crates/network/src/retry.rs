// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Bounded in-place retries for RPC and HTTP operations.

use std::{future::Future, marker::PhantomData, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::backoff::ExponentialBackoff;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (total attempts = 1 initial + max_retries).
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier factor.
    pub backoff_factor: f64,
    /// Maximum jitter in milliseconds to add to delays.
    pub jitter_ms: u64,
    /// Timeout for each individual attempt in milliseconds, `None` for no timeout.
    pub operation_timeout_ms: Option<u64>,
    /// Whether the first retry happens immediately without delay.
    pub immediate_first: bool,
    /// Total time budget across all attempts in milliseconds.
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter_ms: 100,
            operation_timeout_ms: Some(30_000),
            immediate_first: false,
            max_elapsed_ms: None,
        }
    }
}

/// Generic retry manager for network operations.
///
/// Stateless and thread-safe: each call to [`RetryManager::execute_with_retry`] gets its own
/// backoff state.
#[derive(Debug)]
pub struct RetryManager<E> {
    config: RetryConfig,
    _phantom: PhantomData<E>,
}

impl<E> RetryManager<E>
where
    E: std::error::Error,
{
    /// Creates a new retry manager with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backoff parameters are invalid.
    pub fn new(config: RetryConfig) -> anyhow::Result<Self> {
        ExponentialBackoff::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_factor,
            config.jitter_ms,
            config.immediate_first,
        )?;

        Ok(Self {
            config,
            _phantom: PhantomData,
        })
    }

    /// Returns the configuration of this manager.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes an operation with retry logic.
    ///
    /// Each attempt is bounded by the operation timeout; an elapsed timeout is converted into an
    /// error with `create_timeout_error` and is subject to `should_retry` like any other error.
    ///
    /// # Errors
    ///
    /// Returns the last error when it is not retryable, when retries are exhausted, or when the
    /// total time budget is exceeded.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
        should_retry: impl Fn(&E) -> bool,
        create_timeout_error: impl Fn(String) -> E,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(self.config.initial_delay_ms),
            Duration::from_millis(self.config.max_delay_ms),
            self.config.backoff_factor,
            self.config.jitter_ms,
            self.config.immediate_first,
        )
        .map_err(|e| create_timeout_error(format!("Failed to create backoff: {e}")))?;

        let start_time = tokio::time::Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if let Some(max_elapsed_ms) = self.config.max_elapsed_ms
                && start_time.elapsed() > Duration::from_millis(max_elapsed_ms)
            {
                tracing::warn!(
                    "Operation '{operation_name}' exceeded total time budget after {attempt} attempts"
                );
                return Err(create_timeout_error(format!(
                    "Operation '{operation_name}' exceeded total time budget of {max_elapsed_ms}ms"
                )));
            }

            let outcome = match self.config.operation_timeout_ms {
                Some(timeout_ms) => {
                    tokio::time::timeout(Duration::from_millis(timeout_ms), operation())
                        .await
                        .unwrap_or_else(|_| {
                            Err(create_timeout_error(format!(
                                "Operation '{operation_name}' timed out after {timeout_ms}ms"
                            )))
                        })
                }
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "Operation '{operation_name}' succeeded after {} attempts",
                            attempt + 1
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !should_retry(&error) {
                tracing::debug!("Operation '{operation_name}' failed with non-retryable error: {error}");
                return Err(error);
            }

            if attempt >= self.config.max_retries {
                tracing::warn!(
                    "Operation '{operation_name}' failed after {} attempts: {error}",
                    attempt + 1
                );
                return Err(error);
            }

            let delay = backoff.next_duration();
            tracing::debug!(
                "Operation '{operation_name}' failed (attempt {}), retrying in {delay:?}: {error}",
                attempt + 1
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl RetryConfig {
    /// Returns the retry settings for JSON-RPC calls against chain nodes.
    ///
    /// Nodes behind public load balancers fail transiently and often, so attempts are short and
    /// the whole call is bounded well below the per-chain polling interval.
    #[must_use]
    pub const fn rpc() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_factor: 2.0,
            jitter_ms: 250,
            operation_timeout_ms: Some(10_000),
            immediate_first: false,
            max_elapsed_ms: Some(45_000),
        }
    }
}
