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

//! Progress reporting for transfer synchronization.

use std::time::Instant;

/// Rounds `n` and groups its digits in thousands, e.g. `1234567.8` becomes `"1,234,568"`.
fn format_number(n: f64) -> String {
    let digits = (n.round() as u64).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Tracks the block throughput of one chain's transfer sync.
#[derive(Debug)]
pub struct TransferSyncReporter {
    chain_id: u64,
    start_time: Instant,
    last_progress_time: Instant,
    blocks_processed: u64,
    blocks_since_last_report: u64,
    transfers_inserted: u64,
    min_report_interval_secs: f64,
}

impl TransferSyncReporter {
    /// Creates a new reporter that logs at most once per `min_report_interval_secs`.
    #[must_use]
    pub fn new(chain_id: u64, min_report_interval_secs: f64) -> Self {
        let now = Instant::now();
        Self {
            chain_id,
            start_time: now,
            last_progress_time: now,
            blocks_processed: 0,
            blocks_since_last_report: 0,
            transfers_inserted: 0,
            min_report_interval_secs,
        }
    }

    /// Records a synced block range and the number of transfers it inserted.
    pub fn update(&mut self, blocks: u64, transfers: usize) {
        self.blocks_processed += blocks;
        self.blocks_since_last_report += blocks;
        self.transfers_inserted += transfers as u64;
    }

    #[must_use]
    pub const fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    #[must_use]
    pub const fn transfers_inserted(&self) -> u64 {
        self.transfers_inserted
    }

    /// Returns the average rate since the reporter was created, in blocks per second.
    #[must_use]
    pub fn average_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.blocks_processed as f64 / elapsed
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn should_log_progress(&self) -> bool {
        self.blocks_since_last_report > 0
            && self.last_progress_time.elapsed().as_secs_f64() >= self.min_report_interval_secs
    }

    /// Logs current progress against the chain head.
    pub fn log_progress(&mut self, block_number: u64, head: u64) {
        let interval_elapsed = self.last_progress_time.elapsed();
        let current_rate = if interval_elapsed.as_secs_f64() > 0.001 {
            self.blocks_since_last_report as f64 / interval_elapsed.as_secs_f64()
        } else {
            0.0
        };

        tracing::info!(
            "Syncing transfers of chain {} | Block: {} | Behind: {} | Rate: {} blocks/s | Avg: {} blocks/s | Transfers: {}",
            self.chain_id,
            format_number(block_number as f64),
            format_number(head.saturating_sub(block_number) as f64),
            format_number(current_rate),
            format_number(self.average_rate()),
            format_number(self.transfers_inserted as f64),
        );

        self.last_progress_time = Instant::now();
        self.blocks_since_last_report = 0;
    }
}
