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

//! Tokens and ownership balances.

use alloy_primitives::{Address, U256};
use nftsync_core::UnixMillis;
use nftsync_cryptography::digest::md5_concat;
use serde::{Deserialize, Serialize};

use crate::{contract::ContractType, validation::address_key};

/// Computes the identity hash of a token: MD5 of the contract address and token id.
#[must_use]
pub fn token_hash(token_address: &Address, token_id: &U256) -> String {
    md5_concat(&[&address_key(token_address), &token_id.to_string()])
}

/// Computes the identity hash of an ownership record: MD5 of contract address, token id and owner.
#[must_use]
pub fn owner_hash(token_address: &Address, token_id: &U256, owner: &Address) -> String {
    md5_concat(&[
        &address_key(token_address),
        &token_id.to_string(),
        &address_key(owner),
    ])
}

/// A non-fungible token tracked by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nft {
    pub chain_id: u64,
    pub token_address: Address,
    pub token_id: U256,
    pub token_hash: String,
    pub contract_type: ContractType,
    pub token_uri: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub name: Option<String>,
    pub is_destroyed: bool,
    pub block_number_minted: Option<u64>,
    /// Block of the latest transfer applied to this token.
    pub block_number: u64,
    pub sync_metadata_error: Option<String>,
    pub sync_metadata_times: u32,
    pub last_sync_metadata_time: Option<UnixMillis>,
    /// Log index of the latest transfer applied to this token.
    pub transfer_log_index: u64,
}

impl Nft {
    /// Creates a new [`Nft`] first observed in the given transfer position.
    #[must_use]
    pub fn new(
        chain_id: u64,
        token_address: Address,
        token_id: U256,
        contract_type: ContractType,
        block_number: u64,
        transfer_log_index: u64,
    ) -> Self {
        Self {
            chain_id,
            token_address,
            token_id,
            token_hash: token_hash(&token_address, &token_id),
            contract_type,
            token_uri: None,
            metadata: None,
            name: None,
            is_destroyed: false,
            block_number_minted: None,
            block_number,
            sync_metadata_error: None,
            sync_metadata_times: 0,
            last_sync_metadata_time: None,
            transfer_log_index,
        }
    }

    /// Returns `true` if a transfer at (`block_number`, `log_index`) is newer than the last one
    /// applied to this token.
    #[must_use]
    pub fn is_behind(&self, block_number: u64, log_index: u64) -> bool {
        (block_number, log_index) > (self.block_number, self.transfer_log_index)
    }

    /// Merges the ownership fields of a reconciled `planned` token into this stored one.
    ///
    /// Metadata fields are left untouched, destruction is sticky, the mint block is kept once
    /// known and the applied transfer position only moves forward.
    pub fn merge_reconciled(&mut self, planned: &Self) {
        self.is_destroyed |= planned.is_destroyed;
        if self.block_number_minted.is_none() {
            self.block_number_minted = planned.block_number_minted;
        }
        if self.is_behind(planned.block_number, planned.transfer_log_index) {
            self.block_number = planned.block_number;
            self.transfer_log_index = planned.transfer_log_index;
        }
    }
}

/// The balance an owner holds of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerBalance {
    pub chain_id: u64,
    pub token_hash: String,
    pub owner: Address,
    pub owner_hash: String,
    pub balance: U256,
}

impl OwnerBalance {
    /// Creates a new zero [`OwnerBalance`] for `owner` of the given token.
    #[must_use]
    pub fn new(chain_id: u64, token_address: &Address, token_id: &U256, owner: Address) -> Self {
        Self {
            chain_id,
            token_hash: token_hash(token_address, token_id),
            owner,
            owner_hash: owner_hash(token_address, token_id, &owner),
            balance: U256::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use nftsync_cryptography::digest::md5_hex;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_token_hash() {
        let token = address!("0x0000000000000000000000000000000000000abc");
        assert_eq!(
            token_hash(&token, &U256::from(42)),
            md5_hex("0x0000000000000000000000000000000000000abc42")
        );
    }

    #[rstest]
    fn test_owner_hash_distinct_per_owner() {
        let token = address!("0x0000000000000000000000000000000000000abc");
        let a = owner_hash(&token, &U256::from(1), &Address::repeat_byte(0x01));
        let b = owner_hash(&token, &U256::from(1), &Address::repeat_byte(0x02));
        assert_ne!(a, b);
        assert_ne!(a, token_hash(&token, &U256::from(1)));
    }

    #[rstest]
    fn test_nft_new() {
        let token = Address::repeat_byte(0xab);
        let nft = Nft::new(1, token, U256::from(7), ContractType::Erc721, 100, 3);
        assert_eq!(nft.token_hash, token_hash(&token, &U256::from(7)));
        assert!(!nft.is_destroyed);
        assert_eq!(nft.sync_metadata_times, 0);
    }

    #[rstest]
    #[case(100, 4, true)]
    #[case(101, 0, true)]
    #[case(100, 3, false)]
    #[case(99, 9, false)]
    fn test_is_behind(#[case] block: u64, #[case] log_index: u64, #[case] expected: bool) {
        let nft = Nft::new(
            1,
            Address::repeat_byte(0xab),
            U256::from(7),
            ContractType::Erc721,
            100,
            3,
        );
        assert_eq!(nft.is_behind(block, log_index), expected);
    }

    #[rstest]
    fn test_merge_reconciled_keeps_metadata_and_destruction() {
        let token = Address::repeat_byte(0xab);
        let mut stored = Nft::new(1, token, U256::from(7), ContractType::Erc721, 100, 3);
        stored.is_destroyed = true;
        stored.name = Some("Resolved".to_string());
        stored.sync_metadata_times = 2;

        let mut planned = Nft::new(1, token, U256::from(7), ContractType::Erc721, 101, 0);
        planned.block_number_minted = Some(90);
        stored.merge_reconciled(&planned);

        assert!(stored.is_destroyed);
        assert_eq!(stored.name.as_deref(), Some("Resolved"));
        assert_eq!(stored.sync_metadata_times, 2);
        assert_eq!(stored.block_number_minted, Some(90));
        assert_eq!((stored.block_number, stored.transfer_log_index), (101, 0));

        let stale = Nft::new(1, token, U256::from(7), ContractType::Erc721, 95, 8);
        stored.merge_reconciled(&stale);
        assert_eq!((stored.block_number, stored.transfer_log_index), (101, 0));
    }
}
