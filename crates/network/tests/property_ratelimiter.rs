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

//! Property-based tests for multi-window admission.

use std::time::Duration;

use nftsync_network::ratelimiter::{
    InMemoryRateLimiter, RateLimitPolicy, RateLimiter, RateWindow,
};
use proptest::prelude::*;
use rstest::rstest;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    /// Exactly `limit` unit calls are admitted within one window and the next one is refused.
    #[rstest]
    fn admits_exactly_limit(limit in 1u64..=200) {
        let policy = RateLimitPolicy::new(
            "provider",
            vec![RateWindow::new("minute", Duration::from_secs(60), limit)],
        )
        .unwrap();
        let limiter = InMemoryRateLimiter::new(policy);

        block_on(async {
            for _ in 0..limit {
                prop_assert!(limiter.try_acquire(1).await.unwrap());
            }
            prop_assert!(!limiter.try_acquire(1).await.unwrap());
            Ok(())
        })?;
    }

    /// With several windows the tightest one bounds admission, counted in whole calls.
    #[rstest]
    fn tightest_window_governs(
        limits in proptest::collection::vec(1u64..=100, 1..=3),
        cost in 1u64..=10
    ) {
        let windows = limits
            .iter()
            .enumerate()
            .map(|(i, limit)| RateWindow::new(format!("w{i}"), Duration::from_secs(60), *limit))
            .collect();
        let limiter = InMemoryRateLimiter::new(RateLimitPolicy::new("provider", windows).unwrap());
        let expected = limits.iter().map(|l| l / cost).min().unwrap();

        block_on(async {
            let mut admitted = 0;
            for _ in 0..(expected + 5) {
                if limiter.try_acquire(cost).await.unwrap() {
                    admitted += 1;
                }
            }
            prop_assert_eq!(admitted, expected);
            Ok(())
        })?;
    }
}
