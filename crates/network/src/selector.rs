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

//! Smoothed weighted round-robin selection over an endpoint pool.
//!
//! On every call each entry's current weight grows by its static weight; the entry with the
//! highest current weight wins (first in pool order on ties) and has the total weight
//! subtracted. Over any window of `sum(weights)` consecutive selections each entry is chosen
//! exactly `weight` times, and heavy entries are interleaved rather than chosen in bursts.
//!
//! Current weights are process-local. They start at zero on construction and are never shared
//! or persisted; they only shape the distribution of calls.

use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
struct Slot<T> {
    item: T,
    weight: i64,
    current: i64,
}

/// A thread-safe smoothed weighted round-robin chooser.
#[derive(Debug)]
pub struct WeightedSelector<T> {
    slots: Mutex<Vec<Slot<T>>>,
    total_weight: i64,
}

impl<T: Clone> WeightedSelector<T> {
    /// Creates a new [`WeightedSelector`] from `(item, weight)` pairs in pool order.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is empty or any weight is zero.
    pub fn new(pool: impl IntoIterator<Item = (T, u32)>) -> anyhow::Result<Self> {
        let slots: Vec<Slot<T>> = pool
            .into_iter()
            .map(|(item, weight)| Slot {
                item,
                weight: i64::from(weight),
                current: 0,
            })
            .collect();

        if slots.is_empty() {
            anyhow::bail!("Cannot select from an empty pool");
        }
        if let Some(index) = slots.iter().position(|s| s.weight == 0) {
            anyhow::bail!("Pool entry {index} has zero weight");
        }

        let total_weight = slots.iter().map(|s| s.weight).sum();
        Ok(Self {
            slots: Mutex::new(slots),
            total_weight,
        })
    }

    /// Selects the next entry.
    pub fn select(&self) -> T {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let mut best = 0;
        for index in 0..slots.len() {
            slots[index].current += slots[index].weight;
            if slots[index].current > slots[best].current {
                best = index;
            }
        }

        slots[best].current -= self.total_weight;
        slots[best].item.clone()
    }

    /// Returns the number of entries in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Always `false`: construction rejects empty pools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the sum of all static weights.
    #[must_use]
    pub const fn total_weight(&self) -> i64 {
        self.total_weight
    }

    /// Returns a snapshot of the pool items in order.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_classic_sequence() {
        let selector = WeightedSelector::new([("a", 5), ("b", 1), ("c", 1)]).unwrap();
        let picks: Vec<&str> = (0..7).map(|_| selector.select()).collect();
        assert_eq!(picks, vec!["a", "a", "b", "a", "c", "a", "a"]);
    }

    #[rstest]
    fn test_equal_weights_rotate_in_pool_order() {
        let selector = WeightedSelector::new([("x", 1), ("y", 1), ("z", 1)]).unwrap();
        let picks: Vec<&str> = (0..6).map(|_| selector.select()).collect();
        assert_eq!(picks, vec!["x", "y", "z", "x", "y", "z"]);
    }

    #[rstest]
    fn test_single_entry_always_selected() {
        let selector = WeightedSelector::new([("only", 3)]).unwrap();
        for _ in 0..10 {
            assert_eq!(selector.select(), "only");
        }
    }

    #[rstest]
    fn test_rejects_empty_and_zero_weight() {
        assert!(WeightedSelector::<&str>::new([]).is_err());
        assert!(WeightedSelector::new([("a", 1), ("b", 0)]).is_err());
    }

    #[rstest]
    fn test_items_and_total_weight() {
        let selector = WeightedSelector::new([("a", 2), ("b", 3)]).unwrap();
        assert_eq!(selector.items(), vec!["a", "b"]);
        assert_eq!(selector.total_weight(), 5);
        assert_eq!(selector.len(), 2);
    }
}
