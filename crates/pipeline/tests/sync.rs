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

//! Transfer sync and reconciliation against a scripted node.

mod common;

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, U256};
use common::{
    mocks::{MockRpcClient, transfer_log},
    test_config, test_context,
};
use nftsync_common::repository::Repository;
use nftsync_model::{
    messages::{METADATA_SYNC_EXCHANGE, TRANSFER_EXCHANGE},
    owner_hash,
    stubs::{STUB_OWNER_A, STUB_OWNER_B, STUB_TOKEN_ADDRESS},
    token_hash,
};
use nftsync_pipeline::{
    reconcile::{ReconcileOutcome, Reconciler},
    sync::{SyncError, SyncOutcome, TransferSyncEngine},
};
use rstest::rstest;

fn scripted_node(head: u64) -> Arc<MockRpcClient> {
    let node = Arc::new(MockRpcClient::new());
    node.set_head(head);
    node.push_log(transfer_log(
        100,
        0,
        &Address::ZERO,
        &STUB_OWNER_A,
        &STUB_TOKEN_ADDRESS,
        1,
    ));
    node.push_log(transfer_log(
        103,
        2,
        &STUB_OWNER_A,
        &STUB_OWNER_B,
        &STUB_TOKEN_ADDRESS,
        1,
    ));
    node
}

#[rstest]
#[tokio::test]
async fn test_tick_inserts_transfers_and_advances_cursor() {
    let node = scripted_node(105);
    let (ctx, backends) = test_context(test_config(), node);
    let mut engine = TransferSyncEngine::new(ctx, 1).unwrap();

    let outcome = engine.tick().await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            from_block: 100,
            to_block: 105,
            head: 105,
            inserted: 2,
        }
    );
    assert_eq!(backends.repository.sync_cursor(1).await.unwrap(), Some(105));
    assert_eq!(backends.broker.peek(TRANSFER_EXCHANGE, "1").len(), 2);

    let outcome = engine.tick().await.unwrap();
    assert_eq!(outcome, SyncOutcome::UpToDate { head: 105 });
}

#[rstest]
#[tokio::test]
async fn test_range_is_bounded_by_block_increment() {
    let node = scripted_node(500);
    let (ctx, backends) = test_context(test_config(), node.clone());
    let mut engine = TransferSyncEngine::new(ctx, 1).unwrap();

    let first = engine.tick().await.unwrap();
    let second = engine.tick().await.unwrap();

    assert!(matches!(
        first,
        SyncOutcome::Synced {
            from_block: 100,
            to_block: 109,
            ..
        }
    ));
    assert!(matches!(
        second,
        SyncOutcome::Synced {
            from_block: 110,
            to_block: 119,
            inserted: 0,
            ..
        }
    ));
    assert_eq!(backends.repository.sync_cursor(1).await.unwrap(), Some(119));
    assert_eq!(node.log_query_count(), 2);
}

#[rstest]
#[tokio::test]
async fn test_reingested_transfers_are_ignored() {
    let node = scripted_node(105);
    let (ctx, backends) = test_context(test_config(), node);
    let mut engine = TransferSyncEngine::new(ctx, 1).unwrap();
    engine.tick().await.unwrap();

    let stored = backends.repository.unprocessed_transfers(1, 10).await.unwrap();
    let inserted = backends.repository.insert_transfers(&stored).await.unwrap();

    assert_eq!(stored.len(), 2);
    assert!(inserted.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_rescanned_range_announces_only_new_transfers() {
    let (first_ctx, first) = test_context(test_config(), scripted_node(105));
    TransferSyncEngine::new(first_ctx, 1)
        .unwrap()
        .tick()
        .await
        .unwrap();
    let mut known = first.repository.unprocessed_transfers(1, 10).await.unwrap();
    known.truncate(1);

    // A previous run stored the mint but stopped before advancing the cursor
    let (ctx, backends) = test_context(test_config(), scripted_node(105));
    backends.repository.insert_transfers(&known).await.unwrap();
    let mut engine = TransferSyncEngine::new(ctx, 1).unwrap();

    let outcome = engine.tick().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Synced { inserted: 1, .. }));
    let announced = backends.broker.peek(TRANSFER_EXCHANGE, "1");
    assert_eq!(announced.len(), 1);
    assert_ne!(announced[0]["transfer_hash"], serde_json::json!(known[0].transfer_hash));
}

#[rstest]
#[tokio::test]
async fn test_transient_head_failure_leaves_no_error_log() {
    let node = scripted_node(105);
    node.fail_head(Some(502));
    let (ctx, backends) = test_context(test_config(), node);
    let mut engine = TransferSyncEngine::new(ctx, 1).unwrap();

    let error = engine.tick().await.unwrap_err();

    assert!(error.is_transient());
    assert!(backends.repository.transfer_errors().is_empty());
    assert_eq!(backends.repository.sync_cursor(1).await.unwrap(), None);
}

#[rstest]
#[tokio::test]
async fn test_fatal_head_failure_is_recorded() {
    let node = scripted_node(105);
    node.fail_head(Some(400));
    let (ctx, backends) = test_context(test_config(), node);
    let mut engine = TransferSyncEngine::new(ctx, 1).unwrap();

    let error = engine.tick().await.unwrap_err();

    assert!(matches!(error, SyncError::Failed { .. }));
    let logs = backends.repository.transfer_errors();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].node, "mock://node");
    assert_eq!((logs[0].from_block, logs[0].to_block), (0, 0));
}

#[rstest]
#[tokio::test]
async fn test_synced_transfers_reconcile_in_order() {
    let node = scripted_node(105);
    let (ctx, backends) = test_context(test_config(), node);
    let mut engine = TransferSyncEngine::new(ctx.clone(), 1).unwrap();
    engine.tick().await.unwrap();
    let reconciler = Reconciler::new(
        1,
        ctx.backends.repository.clone(),
        ctx.backends.broker.clone(),
        Duration::from_millis(50),
    );

    let mint = reconciler.process_next().await.unwrap();
    let transfer = reconciler.process_next().await.unwrap();
    let idle = reconciler.process_next().await.unwrap();

    assert_eq!(
        mint,
        Some(ReconcileOutcome::Applied {
            metadata_requested: true
        })
    );
    assert_eq!(
        transfer,
        Some(ReconcileOutcome::Applied {
            metadata_requested: false
        })
    );
    assert_eq!(idle, None);

    let token_id = U256::from(1);
    let owner_a = owner_hash(&STUB_TOKEN_ADDRESS, &token_id, &STUB_OWNER_A);
    let owner_b = owner_hash(&STUB_TOKEN_ADDRESS, &token_id, &STUB_OWNER_B);
    assert_eq!(backends.repository.balance_of(1, &owner_a), U256::ZERO);
    assert_eq!(backends.repository.balance_of(1, &owner_b), U256::from(1));

    let nft = backends
        .repository
        .get_nft(1, &token_hash(&STUB_TOKEN_ADDRESS, &token_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nft.block_number, 103);
    assert_eq!(nft.block_number_minted, Some(100));
    assert_eq!(backends.broker.peek(METADATA_SYNC_EXCHANGE, "1").len(), 1);
    assert_eq!(backends.broker.unacked_len(), 0);
}
