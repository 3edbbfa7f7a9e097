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

//! Shared fixtures of the pipeline integration tests.

// Each test binary uses a different subset
#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use nftsync_common::{
    broker::InMemoryBroker,
    cache::InMemoryTokenCache,
    config::{ChainOverride, NftSyncConfig},
    lock::InMemoryLockManager,
    repository::InMemoryRepository,
    storage::InMemoryObjectStore,
};
use nftsync_model::RpcEndpoint;
use nftsync_network::ratelimiter::{InMemoryRateLimiter, RateLimiter};
use nftsync_pipeline::{
    context::{Backends, PipelineContext, rate_limit_policy},
    rpc::pool::{PooledClient, RpcPool},
};

use self::mocks::MockRpcClient;

/// The concrete in-memory backends of a test pipeline, for inspection.
#[derive(Debug, Clone)]
pub struct TestBackends {
    pub cache: Arc<InMemoryTokenCache>,
    pub repository: Arc<InMemoryRepository>,
    pub broker: Arc<InMemoryBroker>,
    pub store: Arc<InMemoryObjectStore>,
}

/// Returns a single-chain configuration with short timeouts.
pub fn test_config() -> NftSyncConfig {
    let mut config = NftSyncConfig::default();
    config.support_chains = vec![1];
    config.chains = vec![ChainOverride {
        chain_id: 1,
        endpoints: None,
        block_increment: Some(10),
        start_block: Some(100),
    }];
    config.sync.receive_timeout_ms = 50;
    config.metadata.rpc_timeout_ms = 500;
    config.metadata.fetch_timeout_ms = 2_000;
    config.scheduler.base_delay_ms = 1_000;
    config.metadata.upload_images = true;
    config.metadata.object_store_url = "https://images.test".to_string();
    config
}

/// Builds a pipeline context whose chain 1 is served by `client`.
pub fn test_context(
    config: NftSyncConfig,
    client: Arc<MockRpcClient>,
) -> (Arc<PipelineContext>, TestBackends) {
    let limiter = Arc::new(InMemoryRateLimiter::new(rate_limit_policy(&config)));
    test_context_with(config, RpcEndpoint::new("mock://node", 1), client, limiter)
}

/// Builds a pipeline context whose chain 1 is served by `client` behind `endpoint`, gated
/// by `limiter`.
pub fn test_context_with(
    config: NftSyncConfig,
    endpoint: RpcEndpoint,
    client: Arc<MockRpcClient>,
    limiter: Arc<dyn RateLimiter>,
) -> (Arc<PipelineContext>, TestBackends) {
    let test = TestBackends {
        cache: Arc::new(InMemoryTokenCache::new()),
        repository: Arc::new(InMemoryRepository::new()),
        broker: Arc::new(InMemoryBroker::new()),
        store: Arc::new(InMemoryObjectStore::new(config.metadata.object_store_url.clone())),
    };
    let backends = Backends {
        locks: Arc::new(InMemoryLockManager::new()),
        cache: test.cache.clone(),
        repository: test.repository.clone(),
        broker: test.broker.clone(),
        limiter,
        store: Some(test.store.clone()),
    };

    let pool = RpcPool::new(1, vec![PooledClient { endpoint, client }]).unwrap();
    let ctx = PipelineContext::new(config, backends)
        .unwrap()
        .with_rpc_pool(pool);
    (Arc::new(ctx), test)
}
