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

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy_primitives::Address;
use async_trait::async_trait;
use bytes::Bytes;
use nftsync_model::{hex::parse_hex_u64, validation::address_key};
use nftsync_network::{http::HttpClient, retry::RetryManager};
use serde::de::DeserializeOwned;

use crate::rpc::{
    BlockchainRpcClient,
    error::{BlockchainRpcClientError, EXECUTION_REVERTED_CODE},
    types::{LogFilter, RpcBlockHeader, RpcLog, RpcNodeHttpResponse},
};

const RESPONSE_PREVIEW_LEN: usize = 500;

/// Client for making HTTP-based RPC requests to blockchain nodes.
///
/// This client is designed to interact with Ethereum-compatible blockchain networks, providing
/// methods to execute RPC calls and handle responses in a type-safe manner.
#[derive(Debug)]
pub struct BlockchainHttpRpcClient {
    /// The HTTP URL for the blockchain node's RPC endpoint.
    http_rpc_url: String,
    /// The HTTP client for making RPC http-based requests.
    http_client: HttpClient,
    /// Timeout applied to every request.
    timeout: Duration,
    /// In-place retries of transient failures, `None` for a single attempt.
    retry_manager: Option<Arc<RetryManager<BlockchainRpcClientError>>>,
    request_id: AtomicU64,
}

impl BlockchainHttpRpcClient {
    /// Creates a new HTTP RPC client for the given endpoint URL.
    #[must_use]
    pub const fn new(http_rpc_url: String, http_client: HttpClient, timeout: Duration) -> Self {
        Self {
            http_rpc_url,
            http_client,
            timeout,
            retry_manager: None,
            request_id: AtomicU64::new(1),
        }
    }

    /// Retries transient failures of every call with `retry_manager`.
    #[must_use]
    pub fn with_retry_manager(
        mut self,
        retry_manager: Arc<RetryManager<BlockchainRpcClientError>>,
    ) -> Self {
        self.retry_manager = Some(retry_manager);
        self
    }

    /// Generic method that sends a JSON-RPC request and returns the raw response in bytes.
    async fn send_rpc_request(
        &self,
        rpc_request: &serde_json::Value,
    ) -> Result<Bytes, BlockchainRpcClientError> {
        let body_bytes = serde_json::to_vec(rpc_request).map_err(|e| {
            BlockchainRpcClientError::InvalidParameters(format!("Failed to serialize request: {e}"))
        })?;

        let response = self
            .http_client
            .post_json(&self.http_rpc_url, body_bytes, Some(self.timeout))
            .await?;

        let status = response.status.as_u16();
        if status >= 500 || status == 429 {
            return Err(BlockchainRpcClientError::HttpStatus(status));
        }
        Ok(response.body)
    }

    /// Executes a JSON-RPC method and deserializes the result into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the node returns an error object, or the result
    /// cannot be parsed.
    pub async fn execute_rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, BlockchainRpcClientError> {
        match &self.retry_manager {
            Some(manager) => {
                manager
                    .execute_with_retry(
                        method,
                        || self.execute_rpc_once(method, params.clone()),
                        BlockchainRpcClientError::is_transient,
                        BlockchainRpcClientError::Timeout,
                    )
                    .await
            }
            None => self.execute_rpc_once(method, params).await,
        }
    }

    async fn execute_rpc_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, BlockchainRpcClientError> {
        let rpc_request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let bytes = self.send_rpc_request(&rpc_request).await?;

        match serde_json::from_slice::<RpcNodeHttpResponse<T>>(bytes.as_ref()) {
            Ok(parsed) => {
                if let Some(error) = parsed.error {
                    if error.code == EXECUTION_REVERTED_CODE
                        || error.message.to_lowercase().contains("revert")
                    {
                        Err(BlockchainRpcClientError::Reverted(error.message))
                    } else {
                        Err(BlockchainRpcClientError::RpcError {
                            code: error.code,
                            message: error.message,
                        })
                    }
                } else if let Some(result) = parsed.result {
                    Ok(result)
                } else {
                    Err(BlockchainRpcClientError::MessageParsingError(
                        "Response missing both result and error fields".to_string(),
                    ))
                }
            }
            Err(e) => {
                let raw_response = String::from_utf8_lossy(bytes.as_ref());
                let preview = if raw_response.len() > RESPONSE_PREVIEW_LEN {
                    let mut end = RESPONSE_PREVIEW_LEN;
                    while !raw_response.is_char_boundary(end) {
                        end -= 1;
                    }
                    format!(
                        "{}... (truncated, {} bytes total)",
                        &raw_response[..end],
                        raw_response.len()
                    )
                } else {
                    raw_response.to_string()
                };
                Err(BlockchainRpcClientError::MessageParsingError(format!(
                    "Failed to parse {method} response: {e}\nRaw response: {preview}"
                )))
            }
        }
    }

    /// Creates the `eth_call` parameters targeting a contract with encoded function data.
    #[must_use]
    pub fn construct_eth_call(to: &str, call_data: &[u8], block: Option<u64>) -> serde_json::Value {
        let encoded_data = format!("0x{}", hex::encode(call_data));
        let call = serde_json::json!({
            "to": to,
            "data": encoded_data
        });

        let block_param = if let Some(block_number) = block {
            serde_json::json!(format!("0x{block_number:x}"))
        } else {
            serde_json::json!("latest")
        };

        serde_json::json!([call, block_param])
    }
}

/// Decodes a hexadecimal string response from a blockchain RPC call.
///
/// # Errors
///
/// Returns an `BlockchainRpcClientError::AbiDecodingError` if the hex decoding fails.
pub fn decode_hex_response(encoded_response: &str) -> Result<Vec<u8>, BlockchainRpcClientError> {
    let encoded_str = encoded_response
        .strip_prefix("0x")
        .unwrap_or(encoded_response);
    hex::decode(encoded_str).map_err(|e| {
        BlockchainRpcClientError::AbiDecodingError(format!("Error decoding hex response: {e}"))
    })
}

#[async_trait]
impl BlockchainRpcClient for BlockchainHttpRpcClient {
    fn node(&self) -> &str {
        &self.http_rpc_url
    }

    async fn block_number(&self) -> Result<u64, BlockchainRpcClientError> {
        let head: String = self
            .execute_rpc("eth_blockNumber", serde_json::json!([]))
            .await?;
        parse_hex_u64(&head).map_err(|e| {
            BlockchainRpcClientError::MessageParsingError(format!("Invalid block number {head}: {e}"))
        })
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, BlockchainRpcClientError> {
        self.execute_rpc("eth_getLogs", serde_json::json!([filter.to_params()]))
            .await
    }

    async fn get_block_header(
        &self,
        block_number: u64,
    ) -> Result<RpcBlockHeader, BlockchainRpcClientError> {
        let header: Option<RpcBlockHeader> = self
            .execute_rpc(
                "eth_getBlockByNumber",
                serde_json::json!([format!("0x{block_number:x}"), false]),
            )
            .await?;
        header.ok_or_else(|| {
            BlockchainRpcClientError::MessageParsingError(format!(
                "Block {block_number} not found"
            ))
        })
    }

    async fn eth_call(
        &self,
        to: &Address,
        call_data: &[u8],
    ) -> Result<Vec<u8>, BlockchainRpcClientError> {
        let params = Self::construct_eth_call(&address_key(to), call_data, None);
        let encoded: String = self.execute_rpc("eth_call", params).await?;
        let bytes = decode_hex_response(&encoded)?;
        if bytes.is_empty() {
            return Err(BlockchainRpcClientError::Reverted(
                "empty return data".to_string(),
            ));
        }
        Ok(bytes)
    }
}
