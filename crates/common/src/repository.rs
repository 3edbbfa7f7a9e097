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

//! Durable storage of transfers, tokens, ownership and failure records.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::U256;
use async_trait::async_trait;
use nftsync_model::{
    BalanceDelta, MetadataUpdate, Nft, OwnerBalance, ReconcilePlan, Transfer, TransferStatus,
    messages::{PublishFailure, PublishFailureStatus, TransferErrorLog},
};

/// The relational store behind the pipeline.
///
/// Writes keyed by identity hash are idempotent: re-inserting a known transfer or re-applying a
/// processed reconciliation changes nothing.
#[async_trait]
pub trait Repository: Debug + Send + Sync {
    /// Inserts transfers unknown by hash and returns the hashes of the new ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn insert_transfers(&self, transfers: &[Transfer]) -> anyhow::Result<Vec<String>>;

    /// Finds a transfer by hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn get_transfer(
        &self,
        chain_id: u64,
        transfer_hash: &str,
    ) -> anyhow::Result<Option<Transfer>>;

    /// Returns up to `limit` unprocessed transfers in chain order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn unprocessed_transfers(
        &self,
        chain_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<Transfer>>;

    /// Finds a token by hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn get_nft(&self, chain_id: u64, token_hash: &str) -> anyhow::Result<Option<Nft>>;

    /// Returns every ownership record of a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn owner_balances(
        &self,
        chain_id: u64,
        token_hash: &str,
    ) -> anyhow::Result<Vec<OwnerBalance>>;

    /// Applies a reconciliation plan atomically and marks its transfer processed.
    ///
    /// Returns `false` without writing when the transfer is already processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer is unknown or the write fails.
    async fn apply_reconciliation(&self, plan: &ReconcilePlan) -> anyhow::Result<bool>;

    /// Stores the outcome of a successful metadata resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is unknown or the write fails.
    async fn update_nft_metadata(
        &self,
        chain_id: u64,
        token_hash: &str,
        update: &MetadataUpdate,
    ) -> anyhow::Result<()>;

    /// Records a failed metadata attempt without touching the resolved fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is unknown or the write fails.
    async fn record_metadata_failure(
        &self,
        chain_id: u64,
        token_hash: &str,
        error_msg: &str,
        times: u32,
        at: u64,
    ) -> anyhow::Result<()>;

    /// Returns the last synced block of a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn sync_cursor(&self, chain_id: u64) -> anyhow::Result<Option<u64>>;

    /// Persists the last synced block of a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_sync_cursor(&self, chain_id: u64, block_number: u64) -> anyhow::Result<()>;

    /// Persists a refused publish and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn record_publish_failure(&self, failure: &PublishFailure) -> anyhow::Result<i64>;

    /// Returns up to `limit` pending publish failures, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn pending_publish_failures(&self, limit: usize)
    -> anyhow::Result<Vec<PublishFailure>>;

    /// Marks a publish failure as replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn mark_publish_failure_replayed(&self, id: i64) -> anyhow::Result<()>;

    /// Records a block range which failed to sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn record_transfer_error(&self, log: &TransferErrorLog) -> anyhow::Result<()>;
}

/// Applies one balance delta, saturating debits at zero.
///
/// Returns the new balance and whether the debit underflowed.
#[must_use]
pub fn apply_delta(balance: U256, delta: BalanceDelta) -> (U256, bool) {
    match delta {
        BalanceDelta::Credit(amount) => (balance.saturating_add(amount), false),
        BalanceDelta::Debit(amount) => match balance.checked_sub(amount) {
            Some(remaining) => (remaining, false),
            None => (U256::ZERO, true),
        },
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    transfers: HashMap<(u64, String), Transfer>,
    nfts: HashMap<(u64, String), Nft>,
    balances: HashMap<(u64, String), OwnerBalance>,
    cursors: HashMap<u64, u64>,
    publish_failures: Vec<PublishFailure>,
    transfer_errors: Vec<TransferErrorLog>,
    refuse_reconciliation: bool,
}

/// A process-local [`Repository`] with the same atomicity as the relational store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl InMemoryRepository {
    /// Creates a new empty [`InMemoryRepository`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the recorded transfer error logs.
    #[must_use]
    pub fn transfer_errors(&self) -> Vec<TransferErrorLog> {
        self.state().transfer_errors.clone()
    }

    /// Returns every publish failure, replayed or not.
    #[must_use]
    pub fn publish_failures(&self) -> Vec<PublishFailure> {
        self.state().publish_failures.clone()
    }

    /// Returns the balance `owner_hash` holds, zero when no record exists.
    #[must_use]
    pub fn balance_of(&self, chain_id: u64, owner_hash: &str) -> U256 {
        self.state()
            .balances
            .get(&(chain_id, owner_hash.to_string()))
            .map_or(U256::ZERO, |b| b.balance)
    }

    /// Makes [`Repository::apply_reconciliation`] fail while `refuse` is set.
    pub fn refuse_reconciliation(&self, refuse: bool) {
        self.state().refuse_reconciliation = refuse;
    }

    /// Stores a token directly, bypassing reconciliation.
    pub fn put_nft(&self, nft: Nft) {
        self.state()
            .nfts
            .insert((nft.chain_id, nft.token_hash.clone()), nft);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert_transfers(&self, transfers: &[Transfer]) -> anyhow::Result<Vec<String>> {
        let mut state = self.state();
        let mut inserted = Vec::new();
        for transfer in transfers {
            let key = (transfer.chain_id, transfer.transfer_hash.clone());
            if !state.transfers.contains_key(&key) {
                state.transfers.insert(key, transfer.clone());
                inserted.push(transfer.transfer_hash.clone());
            }
        }
        Ok(inserted)
    }

    async fn get_transfer(
        &self,
        chain_id: u64,
        transfer_hash: &str,
    ) -> anyhow::Result<Option<Transfer>> {
        Ok(self
            .state()
            .transfers
            .get(&(chain_id, transfer_hash.to_string()))
            .cloned())
    }

    async fn unprocessed_transfers(
        &self,
        chain_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<Transfer>> {
        let state = self.state();
        let mut pending: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| t.chain_id == chain_id && t.status != TransferStatus::Processed)
            .cloned()
            .collect();
        pending.sort_by_key(Transfer::position);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_nft(&self, chain_id: u64, token_hash: &str) -> anyhow::Result<Option<Nft>> {
        Ok(self
            .state()
            .nfts
            .get(&(chain_id, token_hash.to_string()))
            .cloned())
    }

    async fn owner_balances(
        &self,
        chain_id: u64,
        token_hash: &str,
    ) -> anyhow::Result<Vec<OwnerBalance>> {
        let mut balances: Vec<OwnerBalance> = self
            .state()
            .balances
            .values()
            .filter(|b| b.chain_id == chain_id && b.token_hash == token_hash)
            .cloned()
            .collect();
        balances.sort_by(|a, b| a.owner.cmp(&b.owner));
        Ok(balances)
    }

    async fn apply_reconciliation(&self, plan: &ReconcilePlan) -> anyhow::Result<bool> {
        let mut state = self.state();
        if state.refuse_reconciliation {
            anyhow::bail!("Reconciliation refused for transfer {}", plan.transfer_hash);
        }
        let transfer_key = (plan.chain_id, plan.transfer_hash.clone());
        match state.transfers.get(&transfer_key) {
            None => anyhow::bail!(
                "Unknown transfer {} on chain {}",
                plan.transfer_hash,
                plan.chain_id
            ),
            Some(t) if t.status == TransferStatus::Processed => return Ok(false),
            Some(_) => {}
        }

        for change in &plan.balance_changes {
            let record = state
                .balances
                .entry((plan.chain_id, change.owner_hash.clone()))
                .or_insert_with(|| {
                    OwnerBalance::new(
                        plan.chain_id,
                        &plan.nft.token_address,
                        &plan.nft.token_id,
                        change.owner,
                    )
                });
            let (balance, underflow) = apply_delta(record.balance, change.delta);
            if underflow {
                tracing::warn!(
                    chain_id = plan.chain_id,
                    owner = %change.owner,
                    token_hash = %plan.nft.token_hash,
                    "Balance underflow clamped to zero"
                );
            }
            record.balance = balance;
        }

        if plan.destroy {
            for balance in state.balances.values_mut().filter(|b| {
                b.chain_id == plan.chain_id && b.token_hash == plan.nft.token_hash
            }) {
                balance.balance = U256::ZERO;
            }
        }

        // The resolver may have written the token since the plan was read
        state
            .nfts
            .entry((plan.chain_id, plan.nft.token_hash.clone()))
            .and_modify(|stored| stored.merge_reconciled(&plan.nft))
            .or_insert_with(|| plan.nft.clone());
        if let Some(transfer) = state.transfers.get_mut(&transfer_key) {
            transfer.status = TransferStatus::Processed;
        }
        Ok(true)
    }

    async fn update_nft_metadata(
        &self,
        chain_id: u64,
        token_hash: &str,
        update: &MetadataUpdate,
    ) -> anyhow::Result<()> {
        let mut state = self.state();
        let nft = state
            .nfts
            .get_mut(&(chain_id, token_hash.to_string()))
            .ok_or_else(|| anyhow::anyhow!("Unknown token {token_hash} on chain {chain_id}"))?;
        nft.token_uri.clone_from(&update.token_uri);
        nft.metadata.clone_from(&update.metadata);
        nft.name.clone_from(&update.name);
        nft.is_destroyed |= update.is_destroyed;
        nft.sync_metadata_error.clone_from(&update.sync_metadata_error);
        nft.sync_metadata_times = update.sync_metadata_times;
        nft.last_sync_metadata_time = Some(update.last_sync_metadata_time);
        Ok(())
    }

    async fn record_metadata_failure(
        &self,
        chain_id: u64,
        token_hash: &str,
        error_msg: &str,
        times: u32,
        at: u64,
    ) -> anyhow::Result<()> {
        let mut state = self.state();
        let nft = state
            .nfts
            .get_mut(&(chain_id, token_hash.to_string()))
            .ok_or_else(|| anyhow::anyhow!("Unknown token {token_hash} on chain {chain_id}"))?;
        nft.sync_metadata_error = Some(error_msg.to_string());
        nft.sync_metadata_times = times;
        nft.last_sync_metadata_time = Some(at);
        Ok(())
    }

    async fn sync_cursor(&self, chain_id: u64) -> anyhow::Result<Option<u64>> {
        Ok(self.state().cursors.get(&chain_id).copied())
    }

    async fn set_sync_cursor(&self, chain_id: u64, block_number: u64) -> anyhow::Result<()> {
        let mut state = self.state();
        let cursor = state.cursors.entry(chain_id).or_insert(block_number);
        if block_number < *cursor {
            anyhow::bail!("Sync cursor for chain {chain_id} cannot move back from {cursor} to {block_number}");
        }
        *cursor = block_number;
        Ok(())
    }

    async fn record_publish_failure(&self, failure: &PublishFailure) -> anyhow::Result<i64> {
        let mut state = self.state();
        let id = i64::try_from(state.publish_failures.len())? + 1;
        let mut record = failure.clone();
        record.id = Some(id);
        record.status = PublishFailureStatus::Pending;
        state.publish_failures.push(record);
        Ok(id)
    }

    async fn pending_publish_failures(
        &self,
        limit: usize,
    ) -> anyhow::Result<Vec<PublishFailure>> {
        Ok(self
            .state()
            .publish_failures
            .iter()
            .filter(|f| f.status == PublishFailureStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_publish_failure_replayed(&self, id: i64) -> anyhow::Result<()> {
        let mut state = self.state();
        let record = state
            .publish_failures
            .iter_mut()
            .find(|f| f.id == Some(id))
            .ok_or_else(|| anyhow::anyhow!("Unknown publish failure {id}"))?;
        record.status = PublishFailureStatus::Replayed;
        Ok(())
    }

    async fn record_transfer_error(&self, log: &TransferErrorLog) -> anyhow::Result<()> {
        self.state().transfer_errors.push(log.clone());
        Ok(())
    }
}
