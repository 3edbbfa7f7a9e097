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

//! On-chain ownership transfers and their positional identity.

use std::fmt::{Display, Formatter};

use alloy_primitives::{Address, U256};
use nftsync_cryptography::digest::md5_concat;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, FromRepr};

use crate::{contract::ContractType, validation::address_key};

/// The processing status of a recorded transfer.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Recorded but not yet applied to ownership.
    #[default]
    Unprocessed = 0,
    /// Claimed by a reconciler.
    InFlight = 10,
    /// Applied to ownership; terminal.
    Processed = 20,
}

impl TransferStatus {
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
            .ok_or_else(|| anyhow::anyhow!("Invalid transfer status code {code}"))
    }
}

/// Computes the positional identity hash of a transfer.
///
/// The hash covers the transaction hash, transaction index, log index, batch array index, token
/// address and token id, concatenated in that order.
#[must_use]
pub fn transfer_hash(
    transaction_hash: &str,
    transaction_index: u64,
    log_index: u64,
    array_index: u32,
    token_address: &Address,
    token_id: &U256,
) -> String {
    md5_concat(&[
        &transaction_hash.to_lowercase(),
        &transaction_index.to_string(),
        &log_index.to_string(),
        &array_index.to_string(),
        &address_key(token_address),
        &token_id.to_string(),
    ])
}

/// An ownership transfer observed on chain.
///
/// ERC-1155 batch transfers produce one record per batch position, distinguished by
/// `array_index`; single transfers always carry an `array_index` of zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub chain_id: u64,
    pub block_number: u64,
    pub block_hash: String,
    /// Block time in UNIX seconds.
    pub block_timestamp: u64,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub log_index: u64,
    pub array_index: u32,
    pub token_address: Address,
    pub token_id: U256,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub contract_type: ContractType,
    pub transfer_hash: String,
    pub status: TransferStatus,
}

impl Transfer {
    /// Creates a new unprocessed [`Transfer`] with its identity hash computed.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: u64,
        block_number: u64,
        block_hash: String,
        block_timestamp: u64,
        transaction_hash: String,
        transaction_index: u64,
        log_index: u64,
        array_index: u32,
        token_address: Address,
        token_id: U256,
        from: Address,
        to: Address,
        amount: U256,
        contract_type: ContractType,
    ) -> Self {
        let transfer_hash = transfer_hash(
            &transaction_hash,
            transaction_index,
            log_index,
            array_index,
            &token_address,
            &token_id,
        );
        Self {
            chain_id,
            block_number,
            block_hash,
            block_timestamp,
            transaction_hash,
            transaction_index,
            log_index,
            array_index,
            token_address,
            token_id,
            from,
            to,
            amount,
            contract_type,
            transfer_hash,
            status: TransferStatus::Unprocessed,
        }
    }

    /// Returns the ordering key within a chain: block, transaction, log, then batch position.
    #[must_use]
    pub const fn position(&self) -> (u64, u64, u64, u32) {
        (
            self.block_number,
            self.transaction_index,
            self.log_index,
            self.array_index,
        )
    }

    /// Returns `true` if the transfer mints from the zero address.
    #[must_use]
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }

    /// Returns `true` if the transfer burns to the zero address.
    #[must_use]
    pub fn is_burn(&self) -> bool {
        self.to == Address::ZERO
    }

    /// Returns the token hash of the transferred token.
    #[must_use]
    pub fn token_hash(&self) -> String {
        crate::nft::token_hash(&self.token_address, &self.token_id)
    }
}

impl Display for Transfer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transfer(chain={}, block={}, tx={}, log={}, idx={}, token={}:{}, {} -> {}, amount={})",
            self.chain_id,
            self.block_number,
            self.transaction_hash,
            self.log_index,
            self.array_index,
            self.token_address,
            self.token_id,
            self.from,
            self.to,
            self.amount,
        )
    }
}
