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

//! Per-chain ingestion of NFT transfer events.
//!
//! Each tick syncs at most one block increment past the persisted cursor under the chain's
//! cursor lock, so concurrent processes never sync the same range. Transfers are inserted before
//! the cursor advances; a crash between the two re-syncs the range, which the identity hash
//! makes harmless.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use nftsync_common::lock::with_lock;
use nftsync_model::{
    SharedChain, Transfer,
    messages::{TRANSFER_EXCHANGE, TransferErrorLog, TransferMessage},
};
use thiserror::Error;

use crate::{
    context::PipelineContext,
    events::transfer::{decode_transfer_log, transfer_event_topics},
    fanout::publish_durable,
    reporting::TransferSyncReporter,
    rpc::{BlockchainRpcClient, error::BlockchainRpcClientError, types::LogFilter},
};

const REPORT_INTERVAL_SECS: f64 = 30.0;

/// The result of one sync tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another process holds the chain's cursor lock.
    Contended,
    /// The cursor is at the chain head.
    UpToDate { head: u64 },
    /// A block range was synced and the cursor advanced to `to_block`.
    Synced {
        from_block: u64,
        to_block: u64,
        head: u64,
        inserted: usize,
    },
}

/// Errors raised by a sync tick; the cursor is unchanged after any of them.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A timeout, network failure or server error; the tick should back off and retry.
    #[error("Transient RPC failure on {node}: {source}")]
    Transient {
        node: String,
        #[source]
        source: BlockchainRpcClientError,
    },
    /// A failure recorded as a transfer error log.
    #[error("Sync of blocks {from_block}..={to_block} failed on {node}: {message}")]
    Failed {
        node: String,
        from_block: u64,
        to_block: u64,
        message: String,
    },
    /// The lock, repository or broker failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SyncError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Syncs the transfers of one chain.
#[derive(Debug)]
pub struct TransferSyncEngine {
    ctx: Arc<PipelineContext>,
    chain: SharedChain,
    lock_ttl: Duration,
    reporter: TransferSyncReporter,
}

impl TransferSyncEngine {
    /// Creates a new [`TransferSyncEngine`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is not synchronized by this process.
    pub fn new(ctx: Arc<PipelineContext>, chain_id: u64) -> anyhow::Result<Self> {
        let chain = ctx
            .registry
            .get(chain_id)
            .ok_or_else(|| anyhow::anyhow!("Chain {chain_id} is not supported"))?;
        Ok(Self {
            lock_ttl: Duration::from_millis(ctx.config.sync.lock_ttl_ms),
            reporter: TransferSyncReporter::new(chain_id, REPORT_INTERVAL_SECS),
            ctx,
            chain,
        })
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    /// Syncs the next block range of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transient`] for retryable RPC failures, [`SyncError::Failed`] for
    /// failures recorded as transfer error logs, or [`SyncError::Store`] if a backend fails.
    pub async fn tick(&mut self) -> Result<SyncOutcome, SyncError> {
        let key = self.ctx.keys.transfer_cursor_lock(self.chain.chain_id);
        let locks = self.ctx.backends.locks.clone();
        let lock_ttl = self.lock_ttl;
        match with_lock(locks.as_ref(), &key, lock_ttl, || async move {
            Ok(self.sync_next_range().await)
        })
        .await?
        {
            Some(result) => result,
            None => Ok(SyncOutcome::Contended),
        }
    }

    async fn sync_next_range(&mut self) -> Result<SyncOutcome, SyncError> {
        let chain_id = self.chain.chain_id;
        let backends = &self.ctx.backends;
        let client = self.ctx.rpc_pool(chain_id)?.select().client;

        let head = match client.block_number().await {
            Ok(head) => head,
            Err(e) => return Err(self.fail(client.as_ref(), e, 0, 0).await),
        };

        let cursor = match backends.repository.sync_cursor(chain_id).await? {
            Some(cursor) => cursor,
            None => {
                let start = self
                    .ctx
                    .config
                    .start_block(chain_id)
                    .map_or(head, |block| block.saturating_sub(1));
                tracing::info!("Starting transfer sync of chain {chain_id} after block {start}");
                backends.repository.set_sync_cursor(chain_id, start).await?;
                start
            }
        };
        if cursor >= head {
            return Ok(SyncOutcome::UpToDate { head });
        }

        let from_block = cursor + 1;
        let to_block = cursor.saturating_add(self.chain.block_increment).min(head);

        let transfers = match self
            .fetch_transfers(client.as_ref(), from_block, to_block)
            .await
        {
            Ok(transfers) => transfers,
            Err(e) => return Err(self.fail(client.as_ref(), e, from_block, to_block).await),
        };

        let new_hashes = backends.repository.insert_transfers(&transfers).await?;
        backends.repository.set_sync_cursor(chain_id, to_block).await?;

        // Known transfers were announced when first inserted
        let routing_key = chain_id.to_string();
        for transfer_hash in &new_hashes {
            let message = TransferMessage::new(chain_id, transfer_hash.clone());
            publish_durable(
                backends.broker.as_ref(),
                backends.repository.as_ref(),
                TRANSFER_EXCHANGE,
                &routing_key,
                &serde_json::to_value(&message).map_err(anyhow::Error::from)?,
            )
            .await?;
        }

        let inserted = new_hashes.len();
        self.reporter.update(to_block - from_block + 1, inserted);
        if self.reporter.should_log_progress() {
            self.reporter.log_progress(to_block, head);
        }
        tracing::debug!(
            "Synced chain {chain_id} blocks {from_block}..={to_block}: {} transfers, {inserted} new",
            transfers.len()
        );

        Ok(SyncOutcome::Synced {
            from_block,
            to_block,
            head,
            inserted,
        })
    }

    /// Fetches and decodes the transfers of an inclusive block range, in chain order.
    async fn fetch_transfers(
        &self,
        client: &dyn BlockchainRpcClient,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Transfer>, BlockchainRpcClientError> {
        let chain_id = self.chain.chain_id;
        let logs = client
            .get_logs(&LogFilter {
                from_block,
                to_block,
                topics0: transfer_event_topics(),
                addresses: Vec::new(),
            })
            .await?;
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let blocks: BTreeSet<u64> = logs.iter().map(|log| log.block_number).collect();
        let mut timestamps = HashMap::with_capacity(blocks.len());
        for block_number in blocks {
            let header = client.get_block_header(block_number).await?;
            timestamps.insert(block_number, header.timestamp);
        }

        let mut transfers = Vec::with_capacity(logs.len());
        for log in &logs {
            let timestamp = timestamps.get(&log.block_number).copied().unwrap_or_default();
            match decode_transfer_log(chain_id, log, timestamp) {
                Ok(decoded) => transfers.extend(decoded),
                Err(e) => tracing::warn!(
                    chain_id,
                    block_number = log.block_number,
                    transaction_hash = %log.transaction_hash,
                    "Skipping undecodable transfer log: {e}"
                ),
            }
        }
        transfers.sort_by_key(Transfer::position);
        Ok(transfers)
    }

    /// Classifies an RPC failure, recording non-transient ones as transfer error logs.
    async fn fail(
        &self,
        client: &dyn BlockchainRpcClient,
        error: BlockchainRpcClientError,
        from_block: u64,
        to_block: u64,
    ) -> SyncError {
        let node = client.node().to_string();
        if error.is_transient() {
            return SyncError::Transient {
                node,
                source: error,
            };
        }

        let message = error.to_string();
        tracing::error!(
            chain_id = self.chain.chain_id,
            node = %node,
            "Transfer sync of blocks {from_block}..={to_block} failed: {message}"
        );
        let log = TransferErrorLog {
            chain_id: self.chain.chain_id,
            from_block,
            to_block,
            node: node.clone(),
            error_msg: message.clone(),
        };
        if let Err(e) = self.ctx.backends.repository.record_transfer_error(&log).await {
            tracing::warn!("Failed to record transfer error log: {e}");
        }

        SyncError::Failed {
            node,
            from_block,
            to_block,
            message,
        }
    }
}
