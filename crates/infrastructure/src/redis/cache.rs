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

use std::{collections::HashMap, time::Duration};

use alloy_primitives::Address;
use async_trait::async_trait;
use nftsync_common::{cache::TokenCache, keys::KeySpace};
use nftsync_model::contract::{
    ContractAttributes, FIELD_NO_METADATA, FIELD_TOKEN_URI_PREFIX,
};
use redis::aio::ConnectionManager;

/// A [`TokenCache`] over Redis strings, hashes and sets.
#[derive(Clone)]
pub struct RedisTokenCache {
    con: ConnectionManager,
    keys: KeySpace,
}

impl std::fmt::Debug for RedisTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RedisTokenCache))
            .field("keys", &self.keys)
            .finish()
    }
}

impl RedisTokenCache {
    /// Creates a new [`RedisTokenCache`] instance.
    #[must_use]
    pub const fn new(con: ConnectionManager, keys: KeySpace) -> Self {
        Self { con, keys }
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn token_uri(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_hash: &str,
    ) -> anyhow::Result<Option<String>> {
        let key = self.keys.token_uri_cache(chain_id, token_address, token_hash);
        let mut con = self.con.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut con).await?)
    }

    async fn set_token_uri(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_hash: &str,
        uri: &str,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let key = self.keys.token_uri_cache(chain_id, token_address, token_hash);
        let ttl_ms = u64::try_from(ttl.as_millis())?.max(1);
        let mut con = self.con.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(uri)
            .arg("PX")
            .arg(ttl_ms)
            .exec_async(&mut con)
            .await?;
        Ok(())
    }

    async fn contract_attributes(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<ContractAttributes> {
        let key = self.keys.contract_attributes(chain_id, token_address);
        let mut con = self.con.clone();
        let fields: HashMap<String, String> =
            redis::cmd("HGETALL").arg(key).query_async(&mut con).await?;
        Ok(ContractAttributes::from_fields(&fields))
    }

    async fn set_contract_attributes(
        &self,
        chain_id: u64,
        token_address: &Address,
        attributes: &ContractAttributes,
    ) -> anyhow::Result<()> {
        let key = self.keys.contract_attributes(chain_id, token_address);
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut hset = redis::cmd("HSET");
        hset.arg(&key);
        for (field, value) in attributes.to_fields() {
            hset.arg(field).arg(value);
        }
        pipe.add_command(hset).ignore();
        if attributes.token_uri_prefix.is_none() {
            pipe.cmd("HDEL")
                .arg(&key)
                .arg(FIELD_TOKEN_URI_PREFIX)
                .ignore();
        }
        let mut con = self.con.clone();
        pipe.exec_async(&mut con).await?;
        Ok(())
    }

    async fn quarantine_contract(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<()> {
        let key = self.keys.contract_attributes(chain_id, token_address);
        let mut con = self.con.clone();
        redis::cmd("HSET")
            .arg(key)
            .arg(FIELD_NO_METADATA)
            .arg("1")
            .exec_async(&mut con)
            .await?;
        Ok(())
    }

    async fn sync_sources(
        &self,
        chain_id: u64,
        token_address: &Address,
    ) -> anyhow::Result<Vec<String>> {
        let key = self.keys.sync_sources(chain_id, token_address);
        let mut con = self.con.clone();
        let mut sources: Vec<String> =
            redis::cmd("SMEMBERS").arg(key).query_async(&mut con).await?;
        sources.sort();
        Ok(sources)
    }

    async fn add_sync_source(
        &self,
        chain_id: u64,
        token_address: &Address,
        source: &str,
    ) -> anyhow::Result<()> {
        let key = self.keys.sync_sources(chain_id, token_address);
        let mut con = self.con.clone();
        redis::cmd("SADD")
            .arg(key)
            .arg(source)
            .exec_async(&mut con)
            .await?;
        Ok(())
    }
}
