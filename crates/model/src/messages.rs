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

//! Queue messages, the public token projection and durable failure records.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr};

use crate::{contract::ContractType, nft::Nft, validation::address_key};

/// Direct exchange carrying recorded transfers to the per-chain reconciler.
pub const TRANSFER_EXCHANGE: &str = "transfer_exchange";

/// Direct exchange carrying metadata resolution requests.
pub const METADATA_SYNC_EXCHANGE: &str = "metadata_sync_exchange";

/// Direct exchange carrying token projections to subscribers.
pub const SYNC_NFT_EXCHANGE: &str = "sync_nft_exchange";

/// Delayed exchange redelivering to a target exchange after a per-message delay.
pub const DELAY_EXCHANGE: &str = "delay_exchange";

/// Routing action for token updates published to subscribers.
pub const ACTION_UPDATE: &str = "update";

/// A queue message which carries its own attempt counter.
pub trait RetryableMessage {
    /// The number of failed attempts so far.
    fn times(&self) -> u32;

    /// Returns the message with its attempt counter incremented.
    #[must_use]
    fn next_attempt(self) -> Self;
}

/// Requests reconciliation of a recorded transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub chain_id: u64,
    pub transfer_hash: String,
    #[serde(default)]
    pub times: u32,
}

impl TransferMessage {
    /// Creates a new [`TransferMessage`] instance.
    #[must_use]
    pub fn new(chain_id: u64, transfer_hash: impl Into<String>) -> Self {
        Self {
            chain_id,
            transfer_hash: transfer_hash.into(),
            times: 0,
        }
    }
}

impl RetryableMessage for TransferMessage {
    fn times(&self) -> u32 {
        self.times
    }

    fn next_attempt(mut self) -> Self {
        self.times += 1;
        self
    }
}

/// Requests metadata resolution for a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSyncRequest {
    pub chain_id: u64,
    pub token_address: Address,
    pub token_id: U256,
    pub contract_type: ContractType,
    #[serde(default)]
    pub times: u32,
}

impl MetadataSyncRequest {
    /// Creates a new first-attempt [`MetadataSyncRequest`].
    #[must_use]
    pub const fn new(
        chain_id: u64,
        token_address: Address,
        token_id: U256,
        contract_type: ContractType,
    ) -> Self {
        Self {
            chain_id,
            token_address,
            token_id,
            contract_type,
            times: 0,
        }
    }

    /// Returns the hash identifying the requested token.
    #[must_use]
    pub fn token_hash(&self) -> String {
        crate::nft::token_hash(&self.token_address, &self.token_id)
    }
}

impl RetryableMessage for MetadataSyncRequest {
    fn times(&self) -> u32 {
        self.times
    }

    fn next_attempt(mut self) -> Self {
        self.times += 1;
        self
    }
}

/// The public projection of a token published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftProjection {
    pub chain_id: u64,
    pub token_address: String,
    pub token_id: String,
    pub token_hash: String,
    pub contract_type: ContractType,
    pub token_uri: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub name: Option<String>,
    pub is_destroyed: bool,
    pub block_number_minted: Option<u64>,
    pub block_number: u64,
}

impl From<&Nft> for NftProjection {
    fn from(nft: &Nft) -> Self {
        Self {
            chain_id: nft.chain_id,
            token_address: address_key(&nft.token_address),
            token_id: nft.token_id.to_string(),
            token_hash: nft.token_hash.clone(),
            contract_type: nft.contract_type,
            token_uri: nft.token_uri.clone(),
            metadata: nft.metadata.clone(),
            name: nft.name.clone(),
            is_destroyed: nft.is_destroyed,
            block_number_minted: nft.block_number_minted,
            block_number: nft.block_number,
        }
    }
}

/// The replay status of a persisted publish failure.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize,
)]
pub enum PublishFailureStatus {
    #[default]
    Pending = 0,
    Replayed = 20,
}

impl PublishFailureStatus {
    /// Returns the status code as persisted in storage.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }

    /// Parses a persisted status code.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is not a known status.
    pub fn from_code(code: i16) -> anyhow::Result<Self> {
        u8::try_from(code)
            .ok()
            .and_then(Self::from_repr)
            .ok_or_else(|| anyhow::anyhow!("Invalid publish failure status code {code}"))
    }
}

/// A message the broker refused, kept for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishFailure {
    /// Storage identifier, `None` until persisted.
    pub id: Option<i64>,
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub error_msg: String,
    pub status: PublishFailureStatus,
}

impl PublishFailure {
    /// Creates a new pending [`PublishFailure`].
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: serde_json::Value,
        error_msg: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            error_msg: error_msg.into(),
            status: PublishFailureStatus::Pending,
        }
    }
}

/// A delayed requeue the broker refused.
///
/// Persisted as the payload of a [`PublishFailure`] on [`DELAY_EXCHANGE`]; the failure's routing
/// key is the routing key of the target queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedPublish {
    /// The exchange the message is redelivered to.
    pub exchange: String,
    pub delay_ms: u64,
    pub payload: serde_json::Value,
}

/// A block range a chain could not sync, recorded for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferErrorLog {
    pub chain_id: u64,
    pub from_block: u64,
    pub to_block: u64,
    /// The RPC endpoint which served the failed request.
    pub node: String,
    pub error_msg: String,
}
