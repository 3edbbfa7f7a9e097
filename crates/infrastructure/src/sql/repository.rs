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

use alloy_primitives::U256;
use async_trait::async_trait;
use nftsync_common::repository::{Repository, apply_delta};
use nftsync_model::{
    MetadataUpdate, Nft, OwnerBalance, ReconcilePlan, Transfer, TransferStatus,
    messages::{PublishFailure, PublishFailureStatus, TransferErrorLog},
    validation::address_key,
};
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{NftModel, OwnerBalanceModel, PublishFailureModel, TransferModel};

const TRANSFER_COLUMNS: &str = "chain_id, block_number, block_hash, block_timestamp, \
    transaction_hash, transaction_index, log_index, array_index, token_address, \
    token_id::text AS token_id, from_address, to_address, amount::text AS amount, \
    contract_type, transfer_hash, status";

const NFT_COLUMNS: &str = "chain_id, token_address, token_id::text AS token_id, token_hash, \
    contract_type, token_uri, metadata, name, is_destroyed, block_number_minted, block_number, \
    sync_metadata_error, sync_metadata_times, last_sync_metadata_time, transfer_log_index";

fn to_i64(value: u64) -> anyhow::Result<i64> {
    i64::try_from(value).map_err(|_| anyhow::anyhow!("Value {value} exceeds BIGINT range"))
}

fn to_i32(value: u32) -> anyhow::Result<i32> {
    i32::try_from(value).map_err(|_| anyhow::anyhow!("Value {value} exceeds INTEGER range"))
}

/// A [`Repository`] over Postgres.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new [`PostgresRepository`] instance.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn apply_balance_changes(
        tx: &mut Transaction<'_, Postgres>,
        plan: &ReconcilePlan,
    ) -> anyhow::Result<()> {
        let chain_id = to_i64(plan.chain_id)?;
        for change in &plan.balance_changes {
            sqlx::query(
                "INSERT INTO user_nft (chain_id, token_hash, owner, owner_hash, balance) \
                 VALUES ($1, $2, $3, $4, 0) ON CONFLICT (chain_id, owner_hash) DO NOTHING",
            )
            .bind(chain_id)
            .bind(&plan.nft.token_hash)
            .bind(address_key(&change.owner))
            .bind(&change.owner_hash)
            .execute(&mut **tx)
            .await?;

            let current: String = sqlx::query_scalar(
                "SELECT balance::text FROM user_nft WHERE chain_id = $1 AND owner_hash = $2 \
                 FOR UPDATE",
            )
            .bind(chain_id)
            .bind(&change.owner_hash)
            .fetch_one(&mut **tx)
            .await?;
            let current = U256::from_str_radix(&current, 10)?;

            let (balance, underflow) = apply_delta(current, change.delta);
            if underflow {
                tracing::warn!(
                    chain_id = plan.chain_id,
                    owner = %change.owner,
                    token_hash = %plan.nft.token_hash,
                    "Balance underflow clamped to zero"
                );
            }

            sqlx::query(
                "UPDATE user_nft SET balance = $3::numeric, updated_at = NOW() \
                 WHERE chain_id = $1 AND owner_hash = $2",
            )
            .bind(chain_id)
            .bind(&change.owner_hash)
            .bind(balance.to_string())
            .execute(&mut **tx)
            .await?;
        }

        if plan.destroy {
            sqlx::query(
                "UPDATE user_nft SET balance = 0, updated_at = NOW() \
                 WHERE chain_id = $1 AND token_hash = $2 AND balance <> 0",
            )
            .bind(chain_id)
            .bind(&plan.nft.token_hash)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn upsert_nft(tx: &mut Transaction<'_, Postgres>, nft: &Nft) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO nft (chain_id, token_address, token_id, token_hash, contract_type, \
             is_destroyed, block_number_minted, block_number, transfer_log_index) \
             VALUES ($1, $2, $3::numeric, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (chain_id, token_hash) DO UPDATE SET \
             is_destroyed = nft.is_destroyed OR EXCLUDED.is_destroyed, \
             block_number_minted = COALESCE(nft.block_number_minted, EXCLUDED.block_number_minted), \
             block_number = CASE WHEN (EXCLUDED.block_number, EXCLUDED.transfer_log_index) \
             > (nft.block_number, nft.transfer_log_index) \
             THEN EXCLUDED.block_number ELSE nft.block_number END, \
             transfer_log_index = CASE WHEN (EXCLUDED.block_number, EXCLUDED.transfer_log_index) \
             > (nft.block_number, nft.transfer_log_index) \
             THEN EXCLUDED.transfer_log_index ELSE nft.transfer_log_index END, \
             updated_at = NOW()",
        )
        .bind(to_i64(nft.chain_id)?)
        .bind(address_key(&nft.token_address))
        .bind(nft.token_id.to_string())
        .bind(&nft.token_hash)
        .bind(nft.contract_type.to_string())
        .bind(nft.is_destroyed)
        .bind(nft.block_number_minted.map(to_i64).transpose()?)
        .bind(to_i64(nft.block_number)?)
        .bind(to_i64(nft.transfer_log_index)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn insert_transfers(&self, transfers: &[Transfer]) -> anyhow::Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::new();
        for t in transfers {
            let result = sqlx::query(
                "INSERT INTO transfer (chain_id, block_number, block_hash, block_timestamp, \
                 transaction_hash, transaction_index, log_index, array_index, token_address, \
                 token_id, from_address, to_address, amount, contract_type, transfer_hash, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::numeric, $11, $12, \
                 $13::numeric, $14, $15, $16) \
                 ON CONFLICT (chain_id, transfer_hash) DO NOTHING",
            )
            .bind(to_i64(t.chain_id)?)
            .bind(to_i64(t.block_number)?)
            .bind(&t.block_hash)
            .bind(to_i64(t.block_timestamp)?)
            .bind(&t.transaction_hash)
            .bind(to_i64(t.transaction_index)?)
            .bind(to_i64(t.log_index)?)
            .bind(to_i32(t.array_index)?)
            .bind(address_key(&t.token_address))
            .bind(t.token_id.to_string())
            .bind(address_key(&t.from))
            .bind(address_key(&t.to))
            .bind(t.amount.to_string())
            .bind(t.contract_type.to_string())
            .bind(&t.transfer_hash)
            .bind(t.status.code())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                inserted.push(t.transfer_hash.clone());
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_transfer(
        &self,
        chain_id: u64,
        transfer_hash: &str,
    ) -> anyhow::Result<Option<Transfer>> {
        let query =
            format!("SELECT {TRANSFER_COLUMNS} FROM transfer WHERE chain_id = $1 AND transfer_hash = $2");
        Ok(sqlx::query_as::<_, TransferModel>(&query)
            .bind(to_i64(chain_id)?)
            .bind(transfer_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|model| model.0))
    }

    async fn unprocessed_transfers(
        &self,
        chain_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<Transfer>> {
        let query = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfer WHERE chain_id = $1 AND status <> $2 \
             ORDER BY block_number, transaction_index, log_index, array_index LIMIT $3"
        );
        Ok(sqlx::query_as::<_, TransferModel>(&query)
            .bind(to_i64(chain_id)?)
            .bind(TransferStatus::Processed.code())
            .bind(i64::try_from(limit)?)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|model| model.0)
            .collect())
    }

    async fn get_nft(&self, chain_id: u64, token_hash: &str) -> anyhow::Result<Option<Nft>> {
        let query = format!("SELECT {NFT_COLUMNS} FROM nft WHERE chain_id = $1 AND token_hash = $2");
        Ok(sqlx::query_as::<_, NftModel>(&query)
            .bind(to_i64(chain_id)?)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|model| model.0))
    }

    async fn owner_balances(
        &self,
        chain_id: u64,
        token_hash: &str,
    ) -> anyhow::Result<Vec<OwnerBalance>> {
        Ok(sqlx::query_as::<_, OwnerBalanceModel>(
            "SELECT chain_id, token_hash, owner, owner_hash, balance::text AS balance \
             FROM user_nft WHERE chain_id = $1 AND token_hash = $2 ORDER BY owner",
        )
        .bind(to_i64(chain_id)?)
        .bind(token_hash)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|model| model.0)
        .collect())
    }

    async fn apply_reconciliation(&self, plan: &ReconcilePlan) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let status: Option<i16> = sqlx::query_scalar(
            "SELECT status FROM transfer WHERE chain_id = $1 AND transfer_hash = $2 FOR UPDATE",
        )
        .bind(to_i64(plan.chain_id)?)
        .bind(&plan.transfer_hash)
        .fetch_optional(&mut *tx)
        .await?;
        match status.map(TransferStatus::from_code).transpose()? {
            None => anyhow::bail!(
                "Unknown transfer {} on chain {}",
                plan.transfer_hash,
                plan.chain_id
            ),
            Some(TransferStatus::Processed) => {
                tx.rollback().await?;
                return Ok(false);
            }
            Some(_) => {}
        }

        Self::apply_balance_changes(&mut tx, plan).await?;
        Self::upsert_nft(&mut tx, &plan.nft).await?;

        sqlx::query(
            "UPDATE transfer SET status = $3, updated_at = NOW() \
             WHERE chain_id = $1 AND transfer_hash = $2",
        )
        .bind(to_i64(plan.chain_id)?)
        .bind(&plan.transfer_hash)
        .bind(TransferStatus::Processed.code())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update_nft_metadata(
        &self,
        chain_id: u64,
        token_hash: &str,
        update: &MetadataUpdate,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE nft SET token_uri = $3, metadata = $4, name = $5, \
             is_destroyed = is_destroyed OR $6, sync_metadata_error = $7, \
             sync_metadata_times = $8, last_sync_metadata_time = $9, updated_at = NOW() \
             WHERE chain_id = $1 AND token_hash = $2",
        )
        .bind(to_i64(chain_id)?)
        .bind(token_hash)
        .bind(&update.token_uri)
        .bind(&update.metadata)
        .bind(&update.name)
        .bind(update.is_destroyed)
        .bind(&update.sync_metadata_error)
        .bind(to_i32(update.sync_metadata_times)?)
        .bind(to_i64(update.last_sync_metadata_time)?)
        .execute(&self.pool)
        .await?;
        anyhow::ensure!(
            result.rows_affected() == 1,
            "Unknown token {token_hash} on chain {chain_id}"
        );
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
        let result = sqlx::query(
            "UPDATE nft SET sync_metadata_error = $3, sync_metadata_times = $4, \
             last_sync_metadata_time = $5, updated_at = NOW() \
             WHERE chain_id = $1 AND token_hash = $2",
        )
        .bind(to_i64(chain_id)?)
        .bind(token_hash)
        .bind(error_msg)
        .bind(to_i32(times)?)
        .bind(to_i64(at)?)
        .execute(&self.pool)
        .await?;
        anyhow::ensure!(
            result.rows_affected() == 1,
            "Unknown token {token_hash} on chain {chain_id}"
        );
        Ok(())
    }

    async fn sync_cursor(&self, chain_id: u64) -> anyhow::Result<Option<u64>> {
        let block: Option<i64> =
            sqlx::query_scalar("SELECT block_number FROM transfer_sync WHERE chain_id = $1")
                .bind(to_i64(chain_id)?)
                .fetch_optional(&self.pool)
                .await?;
        Ok(block.map(u64::try_from).transpose()?)
    }

    async fn set_sync_cursor(&self, chain_id: u64, block_number: u64) -> anyhow::Result<()> {
        let result = sqlx::query(
            "INSERT INTO transfer_sync (chain_id, block_number) VALUES ($1, $2) \
             ON CONFLICT (chain_id) DO UPDATE SET block_number = EXCLUDED.block_number, \
             updated_at = NOW() WHERE transfer_sync.block_number <= EXCLUDED.block_number",
        )
        .bind(to_i64(chain_id)?)
        .bind(to_i64(block_number)?)
        .execute(&self.pool)
        .await?;
        anyhow::ensure!(
            result.rows_affected() == 1,
            "Sync cursor for chain {chain_id} cannot move back to {block_number}"
        );
        Ok(())
    }

    async fn record_publish_failure(&self, failure: &PublishFailure) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar(
            "INSERT INTO mq_push_error_log (exchange, routing_key, payload, error_msg, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&failure.exchange)
        .bind(&failure.routing_key)
        .bind(&failure.payload)
        .bind(&failure.error_msg)
        .bind(PublishFailureStatus::Pending.code())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn pending_publish_failures(
        &self,
        limit: usize,
    ) -> anyhow::Result<Vec<PublishFailure>> {
        Ok(sqlx::query_as::<_, PublishFailureModel>(
            "SELECT id, exchange, routing_key, payload, error_msg, status \
             FROM mq_push_error_log WHERE status = $1 ORDER BY id LIMIT $2",
        )
        .bind(PublishFailureStatus::Pending.code())
        .bind(i64::try_from(limit)?)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|model| model.0)
        .collect())
    }

    async fn mark_publish_failure_replayed(&self, id: i64) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE mq_push_error_log SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(PublishFailureStatus::Replayed.code())
        .execute(&self.pool)
        .await?;
        anyhow::ensure!(result.rows_affected() == 1, "Unknown publish failure {id}");
        Ok(())
    }

    async fn record_transfer_error(&self, log: &TransferErrorLog) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO transfer_error_log (chain_id, from_block, to_block, node, error_msg) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(to_i64(log.chain_id)?)
        .bind(to_i64(log.from_block)?)
        .bind(to_i64(log.to_block)?)
        .bind(&log.node)
        .bind(&log.error_msg)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
