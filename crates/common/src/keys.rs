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

//! Key names in the shared key-value store.

use alloy_primitives::Address;
use nftsync_model::validation::address_key;

/// Builds every key the pipeline reads or writes, under one deployment prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Creates a new [`KeySpace`] instance; `prefix` is prepended verbatim to every key.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The per-chain lock serializing transfer sync and its cursor.
    #[must_use]
    pub fn transfer_cursor_lock(&self, chain_id: u64) -> String {
        format!("{}lock:{chain_id}:transfer-cursor", self.prefix)
    }

    /// The per-token lock de-duplicating metadata resolution.
    #[must_use]
    pub fn metadata_lock(&self, chain_id: u64, token_hash: &str) -> String {
        format!("{}lock:{chain_id}:metadata:{token_hash}", self.prefix)
    }

    #[must_use]
    pub fn token_uri_cache(&self, chain_id: u64, token_address: &Address, token_hash: &str) -> String {
        format!(
            "{}token-uri-cache:{chain_id}:{}:{token_hash}",
            self.prefix,
            address_key(token_address)
        )
    }

    #[must_use]
    pub fn contract_attributes(&self, chain_id: u64, token_address: &Address) -> String {
        format!(
            "{}contract-attributes:{chain_id}:{}",
            self.prefix,
            address_key(token_address)
        )
    }

    #[must_use]
    pub fn sync_sources(&self, chain_id: u64, token_address: &Address) -> String {
        format!(
            "{}sync-sources:{chain_id}:{}",
            self.prefix,
            address_key(token_address)
        )
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("nft:")
    }
}
