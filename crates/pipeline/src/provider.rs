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

//! Client for a Moralis-compatible NFT data API.
//!
//! Every call is admitted by the shared rate limiter before it is sent, so all processes of a
//! deployment stay within the provider's per-second and per-minute quotas.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use nftsync_common::config::ProviderConfig;
use nftsync_model::validation::address_key;
use nftsync_network::{
    http::{HttpClient, HttpClientConfig, HttpClientError},
    ratelimiter::{
        DEFAULT_ACQUIRE_DEADLINE, DEFAULT_POLL_INTERVAL, RateLimitError, RateLimiter,
        acquire_within,
    },
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

/// Chain ids served by the provider.
pub const PROVIDER_SUPPORTED_CHAINS: &[u64] = &[
    1,        // Ethereum
    5,        // Goerli
    11155111, // Sepolia
    56,       // BNB Smart Chain
    97,       // BNB Smart Chain testnet
    137,      // Polygon
    80001,    // Mumbai
    42161,    // Arbitrum One
    43114,    // Avalanche C-Chain
    250,      // Fantom
    25,       // Cronos
];

/// Errors returned by [`NftDataProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Chain {0} is not supported by the provider")]
    UnsupportedChain(u64),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error(transparent)]
    Http(#[from] HttpClientError),
    #[error("Provider responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Returns `true` for failures worth retrying later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(RateLimitError::Exhausted { .. }) => true,
            Self::Http(e) => e.is_transient(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A token as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderNft {
    pub token_address: String,
    pub token_id: String,
    #[serde(default)]
    pub owner_of: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    /// The metadata document as a JSON string.
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub block_number_minted: Option<String>,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderPage<T> {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    pub result: Vec<T>,
}

impl<T> ProviderPage<T> {
    /// Returns the cursor of the next page, `None` on the last page.
    #[must_use]
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// A rate-limited client of the provider's NFT endpoints.
#[derive(Debug)]
pub struct NftDataProvider {
    http: HttpClient,
    base_url: String,
    limiter: Arc<dyn RateLimiter>,
    call_cost: u64,
    timeout: Duration,
}

impl NftDataProvider {
    /// Creates a new [`NftDataProvider`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value.
    pub fn new(config: &ProviderConfig, limiter: Arc<dyn RateLimiter>) -> anyhow::Result<Self> {
        let http = HttpClient::new(HttpClientConfig {
            default_headers: HashMap::from([
                ("X-API-Key".to_string(), config.api_key.clone()),
                ("Accept".to_string(), "application/json".to_string()),
            ]),
            ..Default::default()
        })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter,
            call_cost: config.call_cost,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    #[must_use]
    pub fn supports_chain(chain_id: u64) -> bool {
        PROVIDER_SUPPORTED_CHAINS.contains(&chain_id)
    }

    /// Fetches a single token, `None` if the provider does not know it.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is unsupported, the call is not admitted in time, or the
    /// request fails.
    pub async fn get_nft_metadata(
        &self,
        chain_id: u64,
        token_address: &Address,
        token_id: &U256,
    ) -> Result<Option<ProviderNft>, ProviderError> {
        let path = format!("/nft/{}/{token_id}", address_key(token_address));
        match self.call(chain_id, &path, None).await {
            Ok(nft) => Ok(Some(nft)),
            Err(ProviderError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists the owners of every token of a contract, one page per call.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is unsupported, the call is not admitted in time, or the
    /// request fails.
    pub async fn get_nft_owners(
        &self,
        chain_id: u64,
        token_address: &Address,
        cursor: Option<&str>,
    ) -> Result<ProviderPage<ProviderNft>, ProviderError> {
        let path = format!("/nft/{}/owners", address_key(token_address));
        self.call(chain_id, &path, cursor).await
    }

    /// Lists the tokens of a contract, one page per call.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is unsupported, the call is not admitted in time, or the
    /// request fails.
    pub async fn get_contract_nfts(
        &self,
        chain_id: u64,
        token_address: &Address,
        cursor: Option<&str>,
    ) -> Result<ProviderPage<ProviderNft>, ProviderError> {
        let path = format!("/nft/{}", address_key(token_address));
        self.call(chain_id, &path, cursor).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        chain_id: u64,
        path: &str,
        cursor: Option<&str>,
    ) -> Result<T, ProviderError> {
        if !Self::supports_chain(chain_id) {
            return Err(ProviderError::UnsupportedChain(chain_id));
        }

        acquire_within(
            self.limiter.as_ref(),
            self.call_cost,
            DEFAULT_POLL_INTERVAL,
            DEFAULT_ACQUIRE_DEADLINE,
        )
        .await?;

        let mut url = format!("{}{path}?chain=0x{chain_id:x}&format=decimal", self.base_url);
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(&urlencoding::encode(cursor));
        }

        let response = self.http.get(&url, Some(self.timeout)).await?;
        if !response.status.is_success() {
            let error = ProviderError::Status {
                status: response.status.as_u16(),
                body: String::from_utf8_lossy(&response.body).into_owned(),
            };
            tracing::warn!(chain_id, path, "Provider call failed: {error}");
            return Err(error);
        }

        serde_json::from_slice(&response.body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
    };
    use nftsync_model::stubs::STUB_TOKEN_ADDRESS;
    use nftsync_network::ratelimiter::{InMemoryRateLimiter, RateLimitPolicy, RateWindow};
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    async fn start_provider() -> SocketAddr {
        let router = Router::new()
            .route(
                "/nft/{address}/owners",
                get(
                    |Path(address): Path<String>, Query(query): Query<HashMap<String, String>>| async move {
                        let cursor = query.get("cursor").cloned();
                        let next = if cursor.is_none() { "page-2" } else { "" };
                        Json(json!({
                            "cursor": next,
                            "page": u32::from(cursor.is_some()),
                            "page_size": 100,
                            "result": [{
                                "token_address": address,
                                "token_id": "7",
                                "owner_of": "0x00000000000000000000000000000000000000a1",
                                "amount": "1",
                            }],
                        }))
                    },
                ),
            )
            .route(
                "/nft/{address}/{token_id}",
                get(
                    |Path((address, token_id)): Path<(String, String)>,
                     Query(query): Query<HashMap<String, String>>,
                     headers: HeaderMap| async move {
                        let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
                        if key != Some("test-key") {
                            return StatusCode::UNAUTHORIZED.into_response();
                        }
                        if token_id == "404" {
                            return StatusCode::NOT_FOUND.into_response();
                        }
                        Json(json!({
                            "token_address": address,
                            "token_id": token_id,
                            "contract_type": "ERC721",
                            "token_uri": "ipfs://QmHash/7",
                            "metadata": "{\"name\":\"Seven\"}",
                            "name": query.get("chain").cloned(),
                        }))
                        .into_response()
                    },
                ),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });
        addr
    }

    fn provider(addr: SocketAddr, limit: u64) -> NftDataProvider {
        let policy = RateLimitPolicy::new(
            "moralis",
            vec![RateWindow::new("second", Duration::from_secs(60), limit)],
        )
        .unwrap();
        NftDataProvider::new(
            &ProviderConfig {
                base_url: format!("http://{addr}/"),
                api_key: "test-key".to_string(),
                ..Default::default()
            },
            Arc::new(InMemoryRateLimiter::new(policy)),
        )
        .unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_nft_metadata() {
        let addr = start_provider().await;
        let nft = provider(addr, 100)
            .get_nft_metadata(137, &STUB_TOKEN_ADDRESS, &U256::from(7))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(nft.token_id, "7");
        assert_eq!(nft.token_address, address_key(&STUB_TOKEN_ADDRESS));
        assert_eq!(nft.token_uri.as_deref(), Some("ipfs://QmHash/7"));
        assert_eq!(nft.name.as_deref(), Some("0x89"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let addr = start_provider().await;
        let nft = provider(addr, 100)
            .get_nft_metadata(1, &STUB_TOKEN_ADDRESS, &U256::from(404))
            .await
            .unwrap();
        assert!(nft.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_owner_pages_follow_cursor() {
        let addr = start_provider().await;
        let provider = provider(addr, 100);

        let first = provider
            .get_nft_owners(1, &STUB_TOKEN_ADDRESS, None)
            .await
            .unwrap();
        assert_eq!(first.next_cursor(), Some("page-2"));
        assert_eq!(first.result[0].owner_of.as_deref(), Some("0x00000000000000000000000000000000000000a1"));

        let second = provider
            .get_nft_owners(1, &STUB_TOKEN_ADDRESS, first.next_cursor())
            .await
            .unwrap();
        assert_eq!(second.next_cursor(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_unsupported_chain_is_refused_without_call() {
        let addr = start_provider().await;
        let result = provider(addr, 100)
            .get_contract_nfts(324, &STUB_TOKEN_ADDRESS, None)
            .await;
        assert!(matches!(result, Err(ProviderError::UnsupportedChain(324))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_exhausted_quota_is_rate_limited() {
        let addr = start_provider().await;
        // Room for exactly one call of cost 5
        let provider = provider(addr, 5);

        provider
            .get_nft_metadata(1, &STUB_TOKEN_ADDRESS, &U256::from(7))
            .await
            .unwrap();
        let result = provider
            .get_nft_metadata(1, &STUB_TOKEN_ADDRESS, &U256::from(7))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(RateLimitError::Exhausted { .. })));
        assert!(err.is_transient());
    }
}
