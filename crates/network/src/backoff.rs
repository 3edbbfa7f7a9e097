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

//! Delay policies for retrying failed network work.
//!
//! [`ExponentialBackoff`] paces repeated attempts against the same RPC endpoint: delays grow
//! geometrically up to a cap, with random jitter so that many chain workers failing at once do
//! not retry in lockstep. [`jittered_delay`] computes the one-shot randomized delay used when a
//! failed item is handed back to the broker for later redelivery.

use std::time::Duration;

use rand::RngExt;

/// An exponential backoff mechanism with optional jitter and immediate-first behavior.
///
/// Successive delays start from an initial delay and are multiplied by a factor on each
/// iteration, capped at a maximum. Random jitter (up to a configured maximum) is added to each
/// returned delay. When `immediate_first` is true the first call to `next_duration` returns
/// zero, after which the immediate flag is disabled.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    delay_initial: Duration,
    delay_max: Duration,
    delay_current: Duration,
    factor: f64,
    /// The maximum random jitter to add (in milliseconds).
    jitter_ms: u64,
    immediate_first: bool,
}

impl ExponentialBackoff {
    /// Creates a new [`ExponentialBackoff`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `factor` is not finite or below 1.0, or if `delay_max` is below
    /// `delay_initial`.
    pub fn new(
        delay_initial: Duration,
        delay_max: Duration,
        factor: f64,
        jitter_ms: u64,
        immediate_first: bool,
    ) -> anyhow::Result<Self> {
        if !factor.is_finite() || factor < 1.0 {
            anyhow::bail!("Backoff factor must be finite and >= 1.0, was {factor}");
        }
        if delay_max < delay_initial {
            anyhow::bail!(
                "Backoff max delay {delay_max:?} is below initial delay {delay_initial:?}"
            );
        }

        Ok(Self {
            delay_initial,
            delay_max,
            delay_current: delay_initial,
            factor,
            jitter_ms,
            immediate_first,
        })
    }

    /// Return the next backoff delay with jitter and update the internal state.
    pub fn next_duration(&mut self) -> Duration {
        if self.immediate_first && self.delay_current == self.delay_initial {
            self.immediate_first = false;
            return Duration::ZERO;
        }

        let jitter = rand::rng().random_range(0..=self.jitter_ms);
        let delay_with_jitter = self.delay_current + Duration::from_millis(jitter);

        let max_nanos = self.delay_max.as_nanos() as u64;
        let next_nanos = (self.delay_current.as_nanos() as f64 * self.factor) as u64;
        self.delay_current = Duration::from_nanos(next_nanos.min(max_nanos));

        delay_with_jitter
    }

    /// Reset the backoff to its initial state.
    pub const fn reset(&mut self) {
        self.delay_current = self.delay_initial;
    }

    /// Returns the current base delay without jitter.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.delay_current
    }
}

/// Returns `ceil(base * (1 + r))` for a uniformly random `r` in `[0, 1)`.
///
/// The result lies in `[base, 2 * base]` after rounding up to whole milliseconds.
#[must_use]
pub fn jittered_delay(base: Duration) -> Duration {
    let factor = 1.0 + rand::rng().random_range(0.0..1.0);
    jittered_delay_with(base, factor)
}

/// Applies a caller supplied jitter `factor` in `[1, 2)` to `base`, rounding up to whole
/// milliseconds.
#[must_use]
pub fn jittered_delay_with(base: Duration, factor: f64) -> Duration {
    let millis = (base.as_millis() as f64 * factor).ceil() as u64;
    Duration::from_millis(millis)
}
