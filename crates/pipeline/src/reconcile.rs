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

//! Ownership reconciliation of recorded transfers.
//!
//! Transfers of a chain are reconciled by a single consumer in chain order. Planning is a pure
//! function of the transfer and the token's current state; the repository applies a plan
//! atomically and refuses to apply it twice.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use nftsync_common::{
    broker::{Delivery, MessageBroker},
    repository::Repository,
};
use nftsync_model::{
    BalanceChange, BalanceDelta, Nft, ReconcilePlan, Transfer, owner_hash,
    messages::{METADATA_SYNC_EXCHANGE, MetadataSyncRequest, TRANSFER_EXCHANGE, TransferMessage},
};

/// Derives the changes a transfer makes to its token and to owner balances.
///
/// The sender is debited unless it is the zero address; the receiver is credited unless it is
/// the zero address, in which case the token is destroyed. Destruction is permanent and the
/// token's last applied transfer position never moves backwards.
#[must_use]
pub fn plan_reconciliation(transfer: &Transfer, existing: Option<&Nft>) -> ReconcilePlan {
    let mut nft = match existing {
        Some(nft) => {
            let mut nft = nft.clone();
            if nft.is_behind(transfer.block_number, transfer.log_index) {
                nft.block_number = transfer.block_number;
                nft.transfer_log_index = transfer.log_index;
            }
            nft
        }
        None => Nft::new(
            transfer.chain_id,
            transfer.token_address,
            transfer.token_id,
            transfer.contract_type,
            transfer.block_number,
            transfer.log_index,
        ),
    };

    if transfer.is_mint() && nft.block_number_minted.is_none() {
        nft.block_number_minted = Some(transfer.block_number);
    }

    let destroy = transfer.is_burn();
    if destroy {
        nft.is_destroyed = true;
    }

    let mut balance_changes = Vec::with_capacity(2);
    if !transfer.is_mint() {
        balance_changes.push(BalanceChange {
            owner: transfer.from,
            owner_hash: owner_hash(&transfer.token_address, &transfer.token_id, &transfer.from),
            delta: BalanceDelta::Debit(transfer.amount),
        });
    }
    if !destroy {
        balance_changes.push(BalanceChange {
            owner: transfer.to,
            owner_hash: owner_hash(&transfer.token_address, &transfer.token_id, &transfer.to),
            delta: BalanceDelta::Credit(transfer.amount),
        });
    }

    ReconcilePlan {
        chain_id: transfer.chain_id,
        transfer_hash: transfer.transfer_hash.clone(),
        nft,
        balance_changes,
        destroy,
    }
}

/// The result of reconciling one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The plan was applied; `metadata_requested` is set when a resolution was queued.
    Applied { metadata_requested: bool },
    /// The transfer had already been reconciled.
    AlreadyProcessed,
    /// No transfer is recorded under the message's hash.
    Missing,
}

/// The per-chain consumer of the transfer queue.
///
/// A delivery whose reconciliation fails is held unacknowledged and retried before any later
/// message of the chain is taken, so transfers are never applied out of order.
#[derive(Debug)]
pub struct Reconciler {
    chain_id: u64,
    repository: Arc<dyn Repository>,
    broker: Arc<dyn MessageBroker>,
    receive_timeout: Duration,
    held: Mutex<Option<(Delivery, TransferMessage)>>,
}

impl Reconciler {
    /// Creates a new [`Reconciler`] instance.
    #[must_use]
    pub fn new(
        chain_id: u64,
        repository: Arc<dyn Repository>,
        broker: Arc<dyn MessageBroker>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            chain_id,
            repository,
            broker,
            receive_timeout,
            held: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Returns `true` while a failed delivery is waiting to be retried.
    #[must_use]
    pub fn is_holding(&self) -> bool {
        self.held().is_some()
    }

    fn held(&self) -> MutexGuard<'_, Option<(Delivery, TransferMessage)>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconciles one transfer and queues metadata resolution for new or destroyed tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be read or the plan cannot be applied.
    pub async fn reconcile(&self, transfer: &Transfer) -> anyhow::Result<ReconcileOutcome> {
        let existing = self
            .repository
            .get_nft(transfer.chain_id, &transfer.token_hash())
            .await?;
        let plan = plan_reconciliation(transfer, existing.as_ref());

        if !self.repository.apply_reconciliation(&plan).await? {
            tracing::debug!("Already reconciled {transfer}");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let metadata_requested = existing.is_none() || plan.destroy;
        if metadata_requested {
            let request = MetadataSyncRequest::new(
                transfer.chain_id,
                transfer.token_address,
                transfer.token_id,
                transfer.contract_type,
            );
            crate::fanout::publish_durable(
                self.broker.as_ref(),
                self.repository.as_ref(),
                METADATA_SYNC_EXCHANGE,
                &transfer.chain_id.to_string(),
                &serde_json::to_value(&request)?,
            )
            .await?;
        }

        Ok(ReconcileOutcome::Applied { metadata_requested })
    }

    /// Reconciles and acknowledges the held delivery, or else the next transfer message of this
    /// chain.
    ///
    /// Returns `None` when the queue stayed empty for the receive timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker fails, or if the transfer cannot be reconciled; the
    /// delivery is then held for the next call.
    pub async fn process_next(&self) -> anyhow::Result<Option<ReconcileOutcome>> {
        let held = self.held().take();
        let (delivery, message) = match held {
            Some(held) => held,
            None => {
                let Some(delivery) = self
                    .broker
                    .receive(TRANSFER_EXCHANGE, &self.chain_id.to_string(), self.receive_timeout)
                    .await?
                else {
                    return Ok(None);
                };
                match delivery.decode::<TransferMessage>() {
                    Ok(message) => (delivery, message),
                    Err(e) => {
                        tracing::error!(chain_id = self.chain_id, "Dropping transfer message: {e}");
                        self.broker.ack(&delivery).await?;
                        return Ok(None);
                    }
                }
            }
        };

        match self.handle(&message).await {
            Ok(outcome) => {
                self.broker.ack(&delivery).await?;
                Ok(Some(outcome))
            }
            Err(e) => {
                *self.held() = Some((delivery, message.clone()));
                Err(e.context(format!(
                    "Reconciliation of transfer {} held for retry",
                    message.transfer_hash
                )))
            }
        }
    }

    async fn handle(&self, message: &TransferMessage) -> anyhow::Result<ReconcileOutcome> {
        match self
            .repository
            .get_transfer(message.chain_id, &message.transfer_hash)
            .await?
        {
            Some(transfer) => self.reconcile(&transfer).await,
            None => {
                tracing::warn!(
                    chain_id = message.chain_id,
                    transfer_hash = %message.transfer_hash,
                    "No recorded transfer for message"
                );
                Ok(ReconcileOutcome::Missing)
            }
        }
    }

    /// Reconciles up to `limit` unprocessed transfers of this chain in chain order.
    ///
    /// Catches up on transfers whose queue message was lost. Stops at the first failure so that
    /// later transfers are never applied ahead of an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending transfers cannot be read or one fails to reconcile.
    pub async fn reconcile_pending(&self, limit: usize) -> anyhow::Result<usize> {
        let pending = self
            .repository
            .unprocessed_transfers(self.chain_id, limit)
            .await?;
        let mut applied = 0;
        for transfer in &pending {
            if let ReconcileOutcome::Applied { .. } = self.reconcile(transfer).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};
    use nftsync_common::{
        broker::{InMemoryBroker, publish_message},
        repository::InMemoryRepository,
    };
    use nftsync_model::{
        contract::ContractType,
        stubs::{STUB_OWNER_A, STUB_OWNER_B, STUB_TOKEN_ADDRESS, stub_transfer, stub_transfer_at},
    };
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_plan_mint() {
        let transfer = stub_transfer(Address::ZERO, STUB_OWNER_A, 7);
        let plan = plan_reconciliation(&transfer, None);

        assert!(!plan.destroy);
        assert_eq!(plan.nft.block_number_minted, Some(100));
        assert_eq!(plan.nft.transfer_log_index, 7);
        assert_eq!(plan.balance_changes.len(), 1);
        assert_eq!(plan.balance_changes[0].owner, STUB_OWNER_A);
        assert_eq!(
            plan.balance_changes[0].delta,
            BalanceDelta::Credit(U256::from(1))
        );
    }

    #[rstest]
    fn test_plan_transfer_debits_before_credit() {
        let transfer = stub_transfer(STUB_OWNER_A, STUB_OWNER_B, 7);
        let plan = plan_reconciliation(&transfer, None);

        let owners: Vec<_> = plan.balance_changes.iter().map(|c| c.owner).collect();
        assert_eq!(owners, vec![STUB_OWNER_A, STUB_OWNER_B]);
        assert_eq!(plan.nft.block_number_minted, None);
    }

    #[rstest]
    fn test_plan_burn_destroys() {
        let transfer = stub_transfer(STUB_OWNER_A, Address::ZERO, 7);
        let plan = plan_reconciliation(&transfer, None);

        assert!(plan.destroy);
        assert!(plan.nft.is_destroyed);
        assert_eq!(plan.balance_changes.len(), 1);
        assert_eq!(
            plan.balance_changes[0].delta,
            BalanceDelta::Debit(U256::from(1))
        );
    }

    #[rstest]
    fn test_plan_keeps_later_position_and_destruction() {
        let mut existing = Nft::new(
            1,
            STUB_TOKEN_ADDRESS,
            U256::from(7),
            ContractType::Erc721,
            200,
            5,
        );
        existing.is_destroyed = true;
        let transfer = stub_transfer_at(STUB_OWNER_A, STUB_OWNER_B, 7, 150, 9);

        let plan = plan_reconciliation(&transfer, Some(&existing));

        assert_eq!(plan.nft.block_number, 200);
        assert_eq!(plan.nft.transfer_log_index, 5);
        assert!(plan.nft.is_destroyed);
        assert!(!plan.destroy);
    }

    fn reconciler(
        repository: Arc<InMemoryRepository>,
        broker: Arc<InMemoryBroker>,
    ) -> Reconciler {
        Reconciler::new(1, repository, broker, Duration::from_millis(50))
    }

    #[rstest]
    #[tokio::test]
    async fn test_mint_then_burn_destroys_and_zeroes_balance() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let reconciler = reconciler(repository.clone(), broker.clone());
        let mint = stub_transfer_at(Address::ZERO, STUB_OWNER_A, 7, 100, 0);
        let burn = stub_transfer_at(STUB_OWNER_A, Address::ZERO, 7, 101, 0);
        repository.insert_transfers(&[mint.clone(), burn.clone()]).await.unwrap();

        assert_eq!(
            reconciler.reconcile(&mint).await.unwrap(),
            ReconcileOutcome::Applied { metadata_requested: true }
        );
        assert_eq!(
            reconciler.reconcile(&burn).await.unwrap(),
            ReconcileOutcome::Applied { metadata_requested: true }
        );

        let nft = repository.get_nft(1, &mint.token_hash()).await.unwrap().unwrap();
        assert!(nft.is_destroyed);
        assert_eq!(nft.block_number, 101);
        let owner = owner_hash(&STUB_TOKEN_ADDRESS, &U256::from(7), &STUB_OWNER_A);
        assert_eq!(repository.balance_of(1, &owner), U256::ZERO);
        assert_eq!(broker.peek(METADATA_SYNC_EXCHANGE, "1").len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reconcile_twice_is_noop() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let reconciler = reconciler(repository.clone(), broker.clone());
        let mint = stub_transfer(Address::ZERO, STUB_OWNER_A, 7);
        repository.insert_transfers(&[mint.clone()]).await.unwrap();

        reconciler.reconcile(&mint).await.unwrap();
        assert_eq!(
            reconciler.reconcile(&mint).await.unwrap(),
            ReconcileOutcome::AlreadyProcessed
        );

        let owner = owner_hash(&STUB_TOKEN_ADDRESS, &U256::from(7), &STUB_OWNER_A);
        assert_eq!(repository.balance_of(1, &owner), U256::from(1));
        assert_eq!(broker.peek(METADATA_SYNC_EXCHANGE, "1").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_process_next_acks_each_delivery() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let reconciler = reconciler(repository.clone(), broker.clone());
        let mint = stub_transfer(Address::ZERO, STUB_OWNER_A, 7);
        repository.insert_transfers(&[mint.clone()]).await.unwrap();

        publish_message(
            broker.as_ref(),
            TRANSFER_EXCHANGE,
            "1",
            &TransferMessage::new(1, mint.transfer_hash.clone()),
        )
        .await
        .unwrap();
        publish_message(broker.as_ref(), TRANSFER_EXCHANGE, "1", &TransferMessage::new(1, "unknown"))
            .await
            .unwrap();

        assert_eq!(
            reconciler.process_next().await.unwrap(),
            Some(ReconcileOutcome::Applied { metadata_requested: true })
        );
        assert_eq!(
            reconciler.process_next().await.unwrap(),
            Some(ReconcileOutcome::Missing)
        );
        assert_eq!(reconciler.process_next().await.unwrap(), None);
        assert_eq!(broker.unacked_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_transfer_blocks_later_transfers_until_applied() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let reconciler = reconciler(repository.clone(), broker.clone());
        let mint = stub_transfer_at(Address::ZERO, STUB_OWNER_A, 7, 100, 0);
        let send = stub_transfer_at(STUB_OWNER_A, STUB_OWNER_B, 7, 101, 0);
        repository.insert_transfers(&[mint.clone(), send.clone()]).await.unwrap();
        for transfer in [&mint, &send] {
            publish_message(
                broker.as_ref(),
                TRANSFER_EXCHANGE,
                "1",
                &TransferMessage::new(1, transfer.transfer_hash.clone()),
            )
            .await
            .unwrap();
        }

        repository.refuse_reconciliation(true);
        assert!(reconciler.process_next().await.is_err());
        assert!(reconciler.process_next().await.is_err());
        assert!(reconciler.is_holding());
        assert_eq!(broker.peek(TRANSFER_EXCHANGE, "1").len(), 1);
        assert_eq!(repository.unprocessed_transfers(1, 10).await.unwrap().len(), 2);

        repository.refuse_reconciliation(false);
        assert_eq!(
            reconciler.process_next().await.unwrap(),
            Some(ReconcileOutcome::Applied { metadata_requested: true })
        );
        assert!(!reconciler.is_holding());
        assert_eq!(
            reconciler.process_next().await.unwrap(),
            Some(ReconcileOutcome::Applied { metadata_requested: false })
        );

        let a = owner_hash(&STUB_TOKEN_ADDRESS, &U256::from(7), &STUB_OWNER_A);
        let b = owner_hash(&STUB_TOKEN_ADDRESS, &U256::from(7), &STUB_OWNER_B);
        assert_eq!(repository.balance_of(1, &a), U256::ZERO);
        assert_eq!(repository.balance_of(1, &b), U256::from(1));
        assert_eq!(broker.unacked_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reconcile_pending_in_chain_order() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let reconciler = reconciler(repository.clone(), broker.clone());
        let mint = stub_transfer_at(Address::ZERO, STUB_OWNER_A, 7, 100, 0);
        let send = stub_transfer_at(STUB_OWNER_A, STUB_OWNER_B, 7, 100, 1);
        repository.insert_transfers(&[send, mint]).await.unwrap();

        assert_eq!(reconciler.reconcile_pending(10).await.unwrap(), 2);

        let a = owner_hash(&STUB_TOKEN_ADDRESS, &U256::from(7), &STUB_OWNER_A);
        let b = owner_hash(&STUB_TOKEN_ADDRESS, &U256::from(7), &STUB_OWNER_B);
        assert_eq!(repository.balance_of(1, &a), U256::ZERO);
        assert_eq!(repository.balance_of(1, &b), U256::from(1));
        assert_eq!(reconciler.reconcile_pending(10).await.unwrap(), 0);
    }
}
