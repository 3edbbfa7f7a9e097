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

//! Repository tests against a live Postgres initialized with `schema/sql`.

#[cfg(target_os = "linux")] // Databases only supported on Linux
mod serial_tests {
    use alloy_primitives::U256;
    use nftsync_common::repository::Repository;
    use nftsync_infrastructure::sql::{
        pg::{PostgresConnectOptions, connect_pg},
        repository::PostgresRepository,
    };
    use nftsync_model::{
        BalanceChange, BalanceDelta, Nft, ReconcilePlan, TransferStatus,
        messages::PublishFailure,
        owner_hash,
        stubs::{STUB_OWNER_A, STUB_OWNER_B, STUB_TOKEN_ADDRESS, stub_transfer_at},
    };

    async fn get_repository() -> PostgresRepository {
        let pool = connect_pg(PostgresConnectOptions::default().into(), 2)
            .await
            .unwrap();
        for table in ["transfer", "nft", "user_nft", "transfer_sync", "mq_push_error_log"] {
            sqlx::query(&format!("TRUNCATE TABLE \"{table}\""))
                .execute(&pool)
                .await
                .unwrap();
        }
        PostgresRepository::new(pool)
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Postgres"]
    async fn test_transfer_reconciliation_round_trip() {
        let repo = get_repository().await;
        let transfer = stub_transfer_at(STUB_OWNER_A, STUB_OWNER_B, 7, 120, 3);

        assert_eq!(
            repo.insert_transfers(&[transfer.clone()]).await.unwrap(),
            vec![transfer.transfer_hash.clone()]
        );
        assert!(repo.insert_transfers(&[transfer.clone()]).await.unwrap().is_empty());
        assert_eq!(repo.unprocessed_transfers(1, 10).await.unwrap().len(), 1);

        let token_id = U256::from(7);
        let plan = ReconcilePlan {
            chain_id: 1,
            transfer_hash: transfer.transfer_hash.clone(),
            nft: Nft::new(1, STUB_TOKEN_ADDRESS, token_id, transfer.contract_type, 120, 3),
            balance_changes: vec![
                BalanceChange {
                    owner: STUB_OWNER_A,
                    owner_hash: owner_hash(&STUB_TOKEN_ADDRESS, &token_id, &STUB_OWNER_A),
                    delta: BalanceDelta::Debit(U256::from(1)),
                },
                BalanceChange {
                    owner: STUB_OWNER_B,
                    owner_hash: owner_hash(&STUB_TOKEN_ADDRESS, &token_id, &STUB_OWNER_B),
                    delta: BalanceDelta::Credit(U256::from(1)),
                },
            ],
            destroy: false,
        };

        assert!(repo.apply_reconciliation(&plan).await.unwrap());
        assert!(!repo.apply_reconciliation(&plan).await.unwrap());

        let stored = repo
            .get_transfer(1, &transfer.transfer_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransferStatus::Processed);
        assert_eq!(stored.token_id, token_id);

        let balances = repo.owner_balances(1, &plan.nft.token_hash).await.unwrap();
        let b = balances.iter().find(|b| b.owner == STUB_OWNER_B).unwrap();
        assert_eq!(b.balance, U256::from(1));
        let a = balances.iter().find(|b| b.owner == STUB_OWNER_A).unwrap();
        assert_eq!(a.balance, U256::ZERO);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Postgres"]
    async fn test_sync_cursor_is_monotonic() {
        let repo = get_repository().await;
        assert_eq!(repo.sync_cursor(56).await.unwrap(), None);

        repo.set_sync_cursor(56, 1_000).await.unwrap();
        repo.set_sync_cursor(56, 1_500).await.unwrap();
        assert!(repo.set_sync_cursor(56, 900).await.is_err());
        assert_eq!(repo.sync_cursor(56).await.unwrap(), Some(1_500));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Postgres"]
    async fn test_publish_failures_replay() {
        let repo = get_repository().await;
        let failure = PublishFailure::new(
            "sync_nft_exchange",
            "abc",
            serde_json::json!({ "chainId": 1 }),
            "connection refused",
        );
        let id = repo.record_publish_failure(&failure).await.unwrap();

        let pending = repo.pending_publish_failures(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, Some(id));
        assert_eq!(pending[0].payload, failure.payload);

        repo.mark_publish_failure_replayed(id).await.unwrap();
        assert!(repo.pending_publish_failures(10).await.unwrap().is_empty());
    }
}
