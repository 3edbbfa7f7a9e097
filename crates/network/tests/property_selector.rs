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

//! Property-based tests for smoothed weighted round-robin selection.

use std::collections::HashMap;

use nftsync_network::selector::WeightedSelector;
use proptest::prelude::*;
use rstest::rstest;

proptest! {
    /// Every window of sum(weights) consecutive selections picks each entry exactly `weight` times.
    #[rstest]
    fn window_counts_match_weights(
        weights in proptest::collection::vec(1u32..=10, 1..=6),
        windows in 1usize..=4
    ) {
        let selector = WeightedSelector::new(weights.iter().copied().enumerate()).unwrap();
        let total: u32 = weights.iter().sum();

        for _ in 0..windows {
            let mut counts: HashMap<usize, u32> = HashMap::new();
            for _ in 0..total {
                *counts.entry(selector.select()).or_default() += 1;
            }
            for (index, weight) in weights.iter().enumerate() {
                prop_assert_eq!(counts.get(&index).copied().unwrap_or(0), *weight);
            }
        }
    }

    /// No entry is selected more than `ceil(weight / other_weight)` times in a row.
    #[rstest]
    fn heavy_entries_are_interleaved(heavy in 2u32..=8) {
        let selector = WeightedSelector::new([("heavy", heavy), ("light", 1)]).unwrap();
        let mut run = 0;
        let mut longest = 0;
        for _ in 0..(heavy + 1) * 3 {
            if selector.select() == "heavy" {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        prop_assert!(longest <= heavy);
    }
}
