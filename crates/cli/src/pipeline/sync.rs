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

use std::sync::Arc;

use nftsync_pipeline::{
    PipelineContext,
    sync::{SyncOutcome, TransferSyncEngine},
};

/// Syncs transfers of one chain until the head, or until `max_ranges` block ranges are synced.
///
/// # Errors
///
/// Returns an error if a sync tick fails.
pub async fn run_sync_transfers(
    ctx: Arc<PipelineContext>,
    chain_id: u64,
    max_ranges: Option<u32>,
) -> anyhow::Result<()> {
    let mut engine = TransferSyncEngine::new(ctx, chain_id)?;
    let mut ranges = 0u32;
    let mut inserted_total = 0usize;

    loop {
        if max_ranges.is_some_and(|max| ranges >= max) {
            tracing::info!("Stopping after {ranges} block ranges");
            break;
        }

        match engine.tick().await? {
            SyncOutcome::Contended => {
                anyhow::bail!("Chain {chain_id} is being synced by another process");
            }
            SyncOutcome::UpToDate { head } => {
                tracing::info!("Chain {chain_id} is synced to head {head}");
                break;
            }
            SyncOutcome::Synced {
                from_block,
                to_block,
                head,
                inserted,
            } => {
                ranges += 1;
                inserted_total += inserted;
                tracing::info!(
                    "Synced blocks {from_block}..={to_block} of {head}: {inserted} new transfers"
                );
            }
        }
    }

    tracing::info!("Inserted {inserted_total} transfers for chain {chain_id}");
    Ok(())
}
