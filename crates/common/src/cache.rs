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

//! Ephemeral per-token and per-contract state in the shared key-value store.

use std::{collections::HashSet, fmt::Debug, sync::Arc, time::Duration};

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use nftsync_model::contract::ContractAttributes;
use tokio::time::Instant;

/// Cached lookups shared by all metadata workers.
#[async_trait]
pub trait TokenCache: Debug + Send + Sync {
    /// Returns the cached token URI, if present and not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn token_uri(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_hash: &str,
    ) -> anyhow::Result<Option<String>>;

    /// Caches a resolved token URI for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn set_token_uri(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_hash: &str,
        uri: &str,
        ttl: Duration,
    ) -> anyhow::Result<()>;

    /// Returns the attributes of a contract, defaults when none are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn contract_attributes(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<ContractAttributes>;

    /// Stores the attributes of a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn set_contract_attributes(
        &self,
        chain_id: u64,
        token_address: &Address,
        attributes: &ContractAttributes,
    ) -> anyhow::Result<()>;

    /// Sets the contract quarantine flag, leaving other attributes untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn quarantine_contract(&self, chain_id: u64, token_address: &Address)
    -> anyhow::Result<()>;

    /// Returns the subscriber ids registered for a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn sync_sources(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<Vec<String>>;

    /// Registers `source` for updates on a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn add_sync_source(
        &self,
        chain_id: u64,
        token_address: &Address,
        source: &str,
    ) -> anyhow::Result<()>;
}

type ContractKey = (u64, Address);

/// A process-local [`TokenCache`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenCache {
    uris: Arc<DashMap<(u64, Address, String), (String, Instant)>>,
    attributes: Arc<DashMap<ContractKey, ContractAttributes>>,
    sources: Arc<DashMap<ContractKey, HashSet<String>>>,
}

impl InMemoryTokenCache {
    /// Creates a new [`InMemoryTokenCache`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn token_uri(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_hash: &str,
    ) -> anyhow::Result<Option<String>> {
        let key = (chain_id, *token_address, token_hash.to_string());
        Ok(self
            .uris
            .get(&key)
            .filter(|entry| entry.1 > Instant::now())
            .map(|entry| entry.0.clone()))
    }

    async fn set_token_uri(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_hash: &str,
        uri: &str,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        self.uris.insert(
            (chain_id, *token_address, token_hash.to_string()),
            (uri.to_string(), Instant::now() + ttl),
        );
        Ok(())
    }

    async fn contract_attributes(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<ContractAttributes> {
        Ok(self
            .attributes
            .get(&(chain_id, *token_address))
            .map(|a| a.clone())
            .unwrap_or_default())
    }

    async fn set_contract_attributes(
        &self,
        chain_id: u64,
        token_address: &Address,
        attributes: &ContractAttributes,
    ) -> anyhow::Result<()> {
        self.attributes
            .insert((chain_id, *token_address), attributes.clone());
        Ok(())
    }

    async fn quarantine_contract(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<()> {
        self.attributes
            .entry((chain_id, *token_address))
            .or_default()
            .no_metadata = true;
        Ok(())
    }

    async fn sync_sources(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<Vec<String>> {
        let mut sources: Vec<String> = self
            .sources
            .get(&(chain_id, *token_address))
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        sources.sort();
        Ok(sources)
    }

    async fn add_sync_source(
        &self,
        chain_id: u64,
        token_address: &Address,
        source: &str,
    ) -> anyhow::Result<()> {
        self.sources
            .entry((chain_id, *token_address))
            .or_default()
            .insert(source.to_string());
        Ok(())
    }
}
