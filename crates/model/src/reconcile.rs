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

//! The ownership changes derived from one transfer, applied atomically by a repository.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::nft::Nft;

/// A signed change to one owner's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceDelta {
    Credit(U256),
    Debit(U256),
}

/// A balance change for one owner of the plan's token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub owner: Address,
    pub owner_hash: String,
    pub delta: BalanceDelta,
}

/// Everything a repository must apply, in one transaction, to reconcile a transfer.
///
/// Applying a plan whose transfer is already processed must change nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub chain_id: u64,
    pub transfer_hash: String,
    /// The token as first observed by this transfer; inserted if absent, otherwise only its
    /// block number and transfer log index advance.
    pub nft: Nft,
    /// Changes in application order: the sender's debit before the receiver's credit.
    pub balance_changes: Vec<BalanceChange>,
    /// Marks the token destroyed and zeroes every owner balance.
    pub destroy: bool,
}

/// The persisted outcome of one metadata resolution attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub token_uri: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub name: Option<String>,
    pub is_destroyed: bool,
    pub sync_metadata_error: Option<String>,
    pub sync_metadata_times: u32,
    pub last_sync_metadata_time: u64,
}
