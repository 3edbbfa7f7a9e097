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

//! Supported blockchains and their RPC endpoint pools.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Represents the blockchain networks the pipeline can synchronize.
#[derive(
    Debug,
    Clone,
    Copy,
    Hash,
    PartialOrd,
    PartialEq,
    Ord,
    Eq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[non_exhaustive]
#[strum(ascii_case_insensitive)]
pub enum Blockchain {
    Arbitrum,
    ArbitrumGoerli,
    Bsc,
    Ethereum,
    Goerli,
    Polygon,
    ZkSyncEraTestnet,
}

/// A single RPC target within a chain's endpoint pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    /// The HTTP URL of the JSON-RPC endpoint.
    pub target: String,
    /// The static selection weight (must be positive).
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// The rate-gated provider backing this endpoint, if any.
    #[serde(default)]
    pub provider: Option<String>,
}

const fn default_weight() -> u32 {
    1
}

impl RpcEndpoint {
    /// Creates a new [`RpcEndpoint`] instance.
    #[must_use]
    pub fn new(target: impl Into<String>, weight: u32) -> Self {
        Self {
            target: target.into(),
            weight,
            provider: None,
        }
    }

    /// Marks this endpoint as served by the given rate-gated `provider`.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Defines a blockchain with its identifier, RPC endpoint pool and polling increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// The blockchain network type.
    pub name: Blockchain,
    /// The unique identifier for this blockchain.
    pub chain_id: u64,
    /// The ordered pool of RPC endpoints.
    pub endpoints: Vec<RpcEndpoint>,
    /// The maximum number of blocks fetched per transfer sync tick.
    pub block_increment: u64,
}

/// A thread-safe shared pointer to a `Chain`, enabling efficient reuse across multiple components.
pub type SharedChain = Arc<Chain>;

impl Chain {
    /// Creates a new [`Chain`] instance.
    #[must_use]
    pub const fn new(
        name: Blockchain,
        chain_id: u64,
        endpoints: Vec<RpcEndpoint>,
        block_increment: u64,
    ) -> Self {
        Self {
            name,
            chain_id,
            endpoints,
            block_increment,
        }
    }

    /// Returns a reference to the built-in `Chain` for the given `chain_id`, if supported.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<&'static Self> {
        match chain_id {
            1 => Some(&chains::ETHEREUM),
            5 => Some(&chains::GOERLI),
            56 => Some(&chains::BSC),
            137 => Some(&chains::POLYGON),
            280 => Some(&chains::ZKSYNC_ERA_TESTNET),
            42161 => Some(&chains::ARBITRUM),
            421613 => Some(&chains::ARBITRUM_GOERLI),
            _ => None,
        }
    }

    /// Returns a reference to the built-in `Chain` for the given network name (case-insensitive).
    #[must_use]
    pub fn from_chain_name(name: &str) -> Option<&'static Self> {
        let blockchain = Blockchain::from_str(name).ok()?;
        chains::ALL
            .iter()
            .map(|chain| &***chain)
            .find(|chain| chain.name == blockchain)
    }

    /// Validates the endpoint pool and block increment.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is empty, any weight is zero, or the increment is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoints.is_empty() {
            anyhow::bail!("Chain {} has no RPC endpoints", self.chain_id);
        }
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.weight == 0) {
            anyhow::bail!(
                "Chain {} endpoint {} has zero weight",
                self.chain_id,
                endpoint.target
            );
        }
        if self.block_increment == 0 {
            anyhow::bail!("Chain {} has zero block increment", self.chain_id);
        }
        Ok(())
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chain(name={}, id={})", self.name, self.chain_id)
    }
}

/// Built-in chain definitions backed by public RPC endpoints.
pub mod chains {
    use std::sync::LazyLock;

    use super::{Blockchain, Chain, RpcEndpoint};

    fn pool(targets: &[&str]) -> Vec<RpcEndpoint> {
        targets.iter().map(|t| RpcEndpoint::new(*t, 1)).collect()
    }

    pub static ETHEREUM: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::Ethereum,
            1,
            pool(&[
                "https://ethereum-rpc.publicnode.com",
                "https://eth.llamarpc.com",
                "https://rpc.ankr.com/eth",
            ]),
            100,
        )
    });
    pub static GOERLI: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::Goerli,
            5,
            pool(&["https://ethereum-goerli-rpc.publicnode.com"]),
            500,
        )
    });
    pub static BSC: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::Bsc,
            56,
            pool(&[
                "https://bsc-dataseed.bnbchain.org",
                "https://bsc-dataseed1.defibit.io",
                "https://bsc-rpc.publicnode.com",
            ]),
            500,
        )
    });
    pub static POLYGON: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::Polygon,
            137,
            pool(&["https://polygon-rpc.com"]),
            1000,
        )
    });
    pub static ZKSYNC_ERA_TESTNET: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::ZkSyncEraTestnet,
            280,
            pool(&["https://testnet.era.zksync.dev"]),
            1000,
        )
    });
    pub static ARBITRUM: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::Arbitrum,
            42161,
            pool(&[
                "https://arb1.arbitrum.io/rpc",
                "https://arbitrum-one-rpc.publicnode.com",
                "https://arbitrum.llamarpc.com",
            ]),
            2000,
        )
    });
    pub static ARBITRUM_GOERLI: LazyLock<Chain> = LazyLock::new(|| {
        Chain::new(
            Blockchain::ArbitrumGoerli,
            421613,
            pool(&["https://goerli-rollup.arbitrum.io/rpc"]),
            2000,
        )
    });

    /// Every built-in chain, in ascending chain id order.
    pub static ALL: [&LazyLock<Chain>; 7] = [
        &ETHEREUM,
        &GOERLI,
        &BSC,
        &POLYGON,
        &ZKSYNC_ERA_TESTNET,
        &ARBITRUM,
        &ARBITRUM_GOERLI,
    ];
}

/// The set of chains this process synchronizes, keyed by chain id in registration order.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: IndexMap<u64, SharedChain>,
}

impl ChainRegistry {
    /// Creates a new [`ChainRegistry`] from the given chains.
    ///
    /// # Errors
    ///
    /// Returns an error if any chain fails validation or a chain id is registered twice.
    pub fn new(chains: impl IntoIterator<Item = Chain>) -> anyhow::Result<Self> {
        let mut registry = IndexMap::new();
        for chain in chains {
            chain.validate()?;
            let chain_id = chain.chain_id;
            if registry.insert(chain_id, Arc::new(chain)).is_some() {
                anyhow::bail!("Chain {chain_id} registered more than once");
            }
        }
        Ok(Self { chains: registry })
    }

    /// Creates a registry of the built-in chains for the given ids.
    ///
    /// # Errors
    ///
    /// Returns an error if any id is not a built-in chain.
    pub fn from_chain_ids(chain_ids: &[u64]) -> anyhow::Result<Self> {
        let chains = chain_ids
            .iter()
            .map(|id| {
                Chain::from_chain_id(*id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Unsupported chain id {id}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(chains)
    }

    /// Returns the chain registered under `chain_id`.
    #[must_use]
    pub fn get(&self, chain_id: u64) -> Option<SharedChain> {
        self.chains.get(&chain_id).cloned()
    }

    /// Looks up a chain by numeric id or case-insensitive network name.
    #[must_use]
    pub fn resolve(&self, id_or_name: &str) -> Option<SharedChain> {
        if let Ok(chain_id) = id_or_name.trim().parse::<u64>() {
            return self.get(chain_id);
        }
        let name = Blockchain::from_str(id_or_name.trim()).ok()?;
        self.chains.values().find(|c| c.name == name).cloned()
    }

    /// Returns an iterator over the registered chains.
    pub fn iter(&self) -> impl Iterator<Item = &SharedChain> {
        self.chains.values()
    }

    /// Returns the number of registered chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns `true` if no chains are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, Blockchain::Ethereum)]
    #[case(56, Blockchain::Bsc)]
    #[case(137, Blockchain::Polygon)]
    #[case(42161, Blockchain::Arbitrum)]
    #[case(421613, Blockchain::ArbitrumGoerli)]
    fn test_from_chain_id(#[case] chain_id: u64, #[case] expected: Blockchain) {
        let chain = Chain::from_chain_id(chain_id).unwrap();
        assert_eq!(chain.name, expected);
        assert!(chain.validate().is_ok());
    }

    #[rstest]
    fn test_from_chain_id_unknown() {
        assert!(Chain::from_chain_id(999_999).is_none());
    }

    #[rstest]
    fn test_from_chain_name_case_insensitive() {
        let chain = Chain::from_chain_name("POLYGON").unwrap();
        assert_eq!(chain.chain_id, 137);
    }

    #[rstest]
    fn test_validate_rejects_zero_weight() {
        let chain = Chain::new(
            Blockchain::Ethereum,
            1,
            vec![RpcEndpoint::new("http://localhost:8545", 0)],
            10,
        );
        assert!(chain.validate().is_err());
    }

    #[rstest]
    fn test_validate_rejects_empty_pool_and_zero_increment() {
        let empty = Chain::new(Blockchain::Ethereum, 1, vec![], 10);
        assert!(empty.validate().is_err());

        let zero = Chain::new(
            Blockchain::Ethereum,
            1,
            vec![RpcEndpoint::new("http://localhost:8545", 1)],
            0,
        );
        assert!(zero.validate().is_err());
    }

    #[rstest]
    fn test_registry_rejects_duplicates() {
        let chain = Chain::from_chain_id(1).unwrap().clone();
        let result = ChainRegistry::new(vec![chain.clone(), chain]);
        assert!(result.is_err());
    }

    #[rstest]
    fn test_registry_resolve_by_id_and_name() {
        let registry = ChainRegistry::from_chain_ids(&[1, 56]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("56").unwrap().name, Blockchain::Bsc);
        assert_eq!(registry.resolve("ethereum").unwrap().chain_id, 1);
        assert!(registry.resolve("polygon").is_none());
    }

    #[rstest]
    fn test_registry_preserves_order() {
        let registry = ChainRegistry::from_chain_ids(&[137, 1, 56]).unwrap();
        let ids: Vec<u64> = registry.iter().map(|c| c.chain_id).collect();
        assert_eq!(ids, vec![137, 1, 56]);
    }

    #[rstest]
    fn test_registry_unsupported_chain_id() {
        assert!(ChainRegistry::from_chain_ids(&[1, 12345]).is_err());
    }
}
