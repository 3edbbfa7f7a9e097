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

use std::{sync::Arc, time::Duration};

use nftsync_model::{Chain, RpcEndpoint};
use nftsync_network::{http::HttpClient, retry::RetryManager, selector::WeightedSelector};

use crate::rpc::{
    BlockchainRpcClient, error::BlockchainRpcClientError, http::BlockchainHttpRpcClient,
};

/// An endpoint of a pool together with its client.
#[derive(Debug, Clone)]
pub struct PooledClient {
    pub endpoint: RpcEndpoint,
    pub client: Arc<dyn BlockchainRpcClient>,
}

/// The RPC clients of one chain, chosen by smoothed weighted round-robin.
///
/// The pool is fixed at construction; configuration reloads build a new pool.
#[derive(Debug)]
pub struct RpcPool {
    chain_id: u64,
    clients: Vec<PooledClient>,
    selector: WeightedSelector<usize>,
}

impl RpcPool {
    /// Creates a new [`RpcPool`] from endpoints and their clients, in pool order.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is empty or an endpoint has zero weight.
    pub fn new(chain_id: u64, clients: Vec<PooledClient>) -> anyhow::Result<Self> {
        let selector = WeightedSelector::new(
            clients
                .iter()
                .enumerate()
                .map(|(index, pooled)| (index, pooled.endpoint.weight)),
        )
        .map_err(|e| anyhow::anyhow!("Invalid endpoint pool for chain {chain_id}: {e}"))?;
        Ok(Self {
            chain_id,
            clients,
            selector,
        })
    }

    /// Creates an HTTP client per endpoint of `chain`, sharing one connection pool and the
    /// optional retry manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain's endpoint pool is empty or has a zero weight.
    pub fn from_chain(
        chain: &Chain,
        http_client: &HttpClient,
        timeout: Duration,
        retry_manager: Option<&Arc<RetryManager<BlockchainRpcClientError>>>,
    ) -> anyhow::Result<Self> {
        let clients = chain
            .endpoints
            .iter()
            .map(|endpoint| {
                let mut client =
                    BlockchainHttpRpcClient::new(endpoint.target.clone(), http_client.clone(), timeout);
                if let Some(manager) = retry_manager {
                    client = client.with_retry_manager(manager.clone());
                }
                PooledClient {
                    endpoint: endpoint.clone(),
                    client: Arc::new(client),
                }
            })
            .collect();
        Self::new(chain.chain_id, clients)
    }

    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Selects the client for the next call.
    #[must_use]
    pub fn select(&self) -> PooledClient {
        self.clients[self.selector.select()].clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use nftsync_model::stubs::stub_chain;
    use nftsync_network::http::HttpClientConfig;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_selection_follows_weights() {
        let mut chain = stub_chain();
        chain.endpoints = vec![
            RpcEndpoint::new("http://a", 2),
            RpcEndpoint::new("http://b", 1),
        ];
        let http = HttpClient::new(HttpClientConfig::default()).unwrap();
        let pool = RpcPool::from_chain(&chain, &http, Duration::from_secs(1), None).unwrap();

        let nodes: Vec<String> = (0..6)
            .map(|_| pool.select().client.node().to_string())
            .collect();
        assert_eq!(nodes.iter().filter(|n| *n == "http://a").count(), 4);
        assert_eq!(nodes.iter().filter(|n| *n == "http://b").count(), 2);
    }

    #[rstest]
    fn test_empty_pool_is_error() {
        assert!(RpcPool::new(1, Vec::new()).is_err());
    }
}
