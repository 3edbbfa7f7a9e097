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

//! The collaborators shared by every pipeline component of a process.

use std::{collections::HashMap, sync::Arc, time::Duration};

use nftsync_common::{
    broker::{InMemoryBroker, MessageBroker},
    cache::{InMemoryTokenCache, TokenCache},
    config::NftSyncConfig,
    keys::KeySpace,
    lock::{InMemoryLockManager, LockManager},
    repository::{InMemoryRepository, Repository},
    storage::{InMemoryObjectStore, ObjectStore},
};
use nftsync_model::ChainRegistry;
use nftsync_network::{
    http::{HttpClient, HttpClientConfig},
    ratelimiter::{InMemoryRateLimiter, RateLimitPolicy, RateLimiter},
    retry::RetryManager,
};

use crate::{
    fanout::NotificationFanout,
    provider::NftDataProvider,
    rpc::pool::RpcPool,
    scheduler::RetryScheduler,
};

/// Provider name gating endpoints and provider calls when none is configured.
pub const DEFAULT_PROVIDER: &str = "moralis";

/// The storage and messaging backends a pipeline runs against.
#[derive(Debug, Clone)]
pub struct Backends {
    pub locks: Arc<dyn LockManager>,
    pub cache: Arc<dyn TokenCache>,
    pub repository: Arc<dyn Repository>,
    pub broker: Arc<dyn MessageBroker>,
    pub limiter: Arc<dyn RateLimiter>,
    /// Destination of inline token images, `None` to drop them.
    pub store: Option<Arc<dyn ObjectStore>>,
}

impl Backends {
    /// Returns process-local backends, for tests and single-process runs.
    #[must_use]
    pub fn in_memory(config: &NftSyncConfig) -> Self {
        let store: Option<Arc<dyn ObjectStore>> = config.metadata.upload_images.then(|| {
            Arc::new(InMemoryObjectStore::new(config.metadata.object_store_url.clone()))
                as Arc<dyn ObjectStore>
        });
        Self {
            locks: Arc::new(InMemoryLockManager::new()),
            cache: Arc::new(InMemoryTokenCache::new()),
            repository: Arc::new(InMemoryRepository::new()),
            broker: Arc::new(InMemoryBroker::new()),
            limiter: Arc::new(InMemoryRateLimiter::new(rate_limit_policy(config))),
            store,
        }
    }
}

/// Returns the provider rate limit policy of a deployment.
#[must_use]
pub fn rate_limit_policy(config: &NftSyncConfig) -> RateLimitPolicy {
    let provider = config
        .provider
        .as_ref()
        .map_or(DEFAULT_PROVIDER, |p| p.name.as_str());
    RateLimitPolicy::standard(provider, &config.app_name)
}

/// Configuration, backends and RPC pools of one process.
#[derive(Debug)]
pub struct PipelineContext {
    pub config: NftSyncConfig,
    pub keys: KeySpace,
    pub registry: ChainRegistry,
    pub backends: Backends,
    pub provider: Option<Arc<NftDataProvider>>,
    pools: HashMap<u64, Arc<RpcPool>>,
}

impl PipelineContext {
    /// Creates a new [`PipelineContext`] with an HTTP RPC pool per supported chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain registry, an endpoint pool, the RPC retry settings or the
    /// provider client is invalid.
    pub fn new(config: NftSyncConfig, backends: Backends) -> anyhow::Result<Self> {
        let registry = config.chain_registry()?;
        let http = HttpClient::new(HttpClientConfig::default())?;
        let timeout = Duration::from_millis(config.sync.rpc_timeout_ms);
        let retry_manager = Arc::new(RetryManager::new(config.rpc_retry.clone())?);
        let pools = registry
            .iter()
            .map(|chain| {
                RpcPool::from_chain(chain, &http, timeout, Some(&retry_manager))
                    .map(|pool| (chain.chain_id, Arc::new(pool)))
            })
            .collect::<anyhow::Result<HashMap<_, _>>>()?;

        let provider = config
            .provider
            .as_ref()
            .filter(|p| !p.api_key.is_empty())
            .map(|p| NftDataProvider::new(p, backends.limiter.clone()).map(Arc::new))
            .transpose()?;

        Ok(Self {
            keys: config.key_space(),
            config,
            registry,
            backends,
            provider,
            pools,
        })
    }

    /// Replaces the RPC pool of the pool's chain.
    #[must_use]
    pub fn with_rpc_pool(mut self, pool: RpcPool) -> Self {
        self.pools.insert(pool.chain_id(), Arc::new(pool));
        self
    }

    /// Returns the RPC pool of a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is not synchronized by this process.
    pub fn rpc_pool(&self, chain_id: u64) -> anyhow::Result<Arc<RpcPool>> {
        self.pools
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Chain {chain_id} is not supported"))
    }

    #[must_use]
    pub fn scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(
            self.backends.broker.clone(),
            self.backends.repository.clone(),
            &self.config.scheduler,
        )
    }

    #[must_use]
    pub fn fanout(&self) -> NotificationFanout {
        NotificationFanout::new(
            self.backends.broker.clone(),
            self.backends.repository.clone(),
            self.backends.cache.clone(),
            &self.config.fanout,
        )
    }
}
