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

//! Multi-window rate limiting for third-party data providers.
//!
//! A [`RateLimitPolicy`] names a provider and a set of fixed windows (per second, per caller per
//! second, per minute). A call of a given cost is admitted only if every window has room for
//! it; when any window is full nothing is counted. Implementations must evaluate all windows
//! and apply the increments as one atomic step.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Default cost of one provider call.
pub const DEFAULT_CALL_COST: u64 = 5;

/// Default sleep between admission attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default deadline after which a caller gives up waiting for admission.
pub const DEFAULT_ACQUIRE_DEADLINE: Duration = Duration::from_secs(3);

/// A fixed counting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Key suffix identifying the window, e.g. `second` or `minute`.
    pub name: String,
    /// Window length in milliseconds.
    pub ttl_ms: u64,
    /// Maximum total cost admitted within one window.
    pub limit: u64,
}

impl RateWindow {
    /// Creates a new [`RateWindow`] instance.
    #[must_use]
    pub fn new(name: impl Into<String>, ttl: Duration, limit: u64) -> Self {
        Self {
            name: name.into(),
            ttl_ms: ttl.as_millis() as u64,
            limit,
        }
    }

    /// Returns the window length.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// The set of windows guarding one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub provider: String,
    pub windows: Vec<RateWindow>,
}

impl RateLimitPolicy {
    /// Creates a new [`RateLimitPolicy`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no windows, or a window has a zero length or limit.
    pub fn new(provider: impl Into<String>, windows: Vec<RateWindow>) -> anyhow::Result<Self> {
        let provider = provider.into();
        if windows.is_empty() {
            anyhow::bail!("Rate limit policy for '{provider}' has no windows");
        }
        for window in &windows {
            if window.ttl_ms == 0 || window.limit == 0 {
                anyhow::bail!(
                    "Rate window '{}' for '{provider}' must have a non-zero length and limit",
                    window.name
                );
            }
        }
        Ok(Self { provider, windows })
    }

    /// Returns the standard three-window policy for a provider shared by many processes.
    ///
    /// The caller window is scoped to `app_name` so each deployment gets its own share.
    #[must_use]
    pub fn standard(provider: impl Into<String>, app_name: &str) -> Self {
        Self {
            provider: provider.into(),
            windows: vec![
                RateWindow::new("second", Duration::from_secs(1), 20),
                RateWindow::new(format!("ip-second:{app_name}"), Duration::from_secs(5), 50),
                RateWindow::new("minute", Duration::from_secs(60), 1200),
            ],
        }
    }

    /// Returns the counter key of each window, in window order.
    #[must_use]
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        self.windows
            .iter()
            .map(|w| format!("{prefix}rate:{}:{}", self.provider, w.name))
            .collect()
    }
}

/// Errors returned when waiting for admission.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Admission was not granted before the deadline.
    #[error("Rate limit for '{provider}' not acquired within {waited:?}")]
    Exhausted { provider: String, waited: Duration },
    /// The backing store failed.
    #[error("Rate limiter backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// An atomic multi-window admission gate.
#[async_trait]
pub trait RateLimiter: Debug + Send + Sync {
    /// Returns the policy this limiter enforces.
    fn policy(&self) -> &RateLimitPolicy;

    /// Admits a call of `cost` if every window has room, counting it against all windows.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn try_acquire(&self, cost: u64) -> anyhow::Result<bool>;
}

/// Polls `limiter` every `poll_interval` until a call of `cost` is admitted or `deadline`
/// elapses.
///
/// # Errors
///
/// Returns [`RateLimitError::Exhausted`] on deadline or [`RateLimitError::Backend`] if the
/// limiter fails.
pub async fn acquire_within(
    limiter: &dyn RateLimiter,
    cost: u64,
    poll_interval: Duration,
    deadline: Duration,
) -> Result<(), RateLimitError> {
    let start = Instant::now();
    loop {
        if limiter.try_acquire(cost).await? {
            return Ok(());
        }
        if start.elapsed() + poll_interval > deadline {
            tracing::debug!(
                "Rate limit for '{}' exhausted after {:?}",
                limiter.policy().provider,
                start.elapsed()
            );
            return Err(RateLimitError::Exhausted {
                provider: limiter.policy().provider.clone(),
                waited: start.elapsed(),
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    used: u64,
    expires_at: Instant,
}

/// A process-local [`RateLimiter`] holding fixed-window counters in memory.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    policy: RateLimitPolicy,
    counters: Mutex<HashMap<String, Counter>>,
}

impl InMemoryRateLimiter {
    /// Creates a new [`InMemoryRateLimiter`] instance.
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn admit(&self, cost: u64, now: Instant) -> bool {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);

        let full = self.policy.windows.iter().any(|window| {
            let used = counters
                .get(&window.name)
                .filter(|c| c.expires_at > now)
                .map_or(0, |c| c.used);
            used + cost > window.limit
        });
        if full {
            return false;
        }

        for window in &self.policy.windows {
            let counter = counters
                .entry(window.name.clone())
                .or_insert(Counter {
                    used: 0,
                    expires_at: now + window.ttl(),
                });
            if counter.expires_at <= now {
                *counter = Counter {
                    used: 0,
                    expires_at: now + window.ttl(),
                };
            }
            counter.used += cost;
        }
        true
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    async fn try_acquire(&self, cost: u64) -> anyhow::Result<bool> {
        Ok(self.admit(cost, Instant::now()))
    }
}
