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

use nftsync_model::hex::{deserialize_hex_number, deserialize_opt_hex_number};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A response structure received from an HTTP JSON-RPC blockchain node request.
#[derive(Debug, Deserialize)]
pub struct RpcNodeHttpResponse<T>
where
    T: DeserializeOwned,
{
    /// JSON-RPC version identifier.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request identifier returned by the server.
    #[serde(default)]
    pub id: u64,
    /// Deserialized result, absent when the node returned an error.
    #[serde(bound(deserialize = ""))]
    pub result: Option<T>,
    /// Error object, absent on success.
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// The error member of a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// A log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    /// The emitting contract.
    pub address: String,
    pub topics: Vec<String>,
    /// Hex-encoded non-indexed event data.
    pub data: String,
    #[serde(deserialize_with = "deserialize_hex_number")]
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_hash: String,
    #[serde(deserialize_with = "deserialize_hex_number")]
    pub transaction_index: u64,
    #[serde(deserialize_with = "deserialize_hex_number")]
    pub log_index: u64,
    /// Set when the log was dropped by a chain reorganization.
    #[serde(default)]
    pub removed: bool,
}

/// The block header fields the pipeline reads from `eth_getBlockByNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcBlockHeader {
    #[serde(deserialize_with = "deserialize_opt_hex_number")]
    pub number: Option<u64>,
    pub hash: Option<String>,
    #[serde(deserialize_with = "deserialize_hex_number")]
    pub timestamp: u64,
}

/// An `eth_getLogs` filter over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    /// Event signature hashes matched in the first topic position.
    pub topics0: Vec<String>,
    /// Restricts the filter to these contracts when non-empty.
    pub addresses: Vec<String>,
}

impl LogFilter {
    /// Returns the filter as the single `eth_getLogs` parameter object.
    #[must_use]
    pub fn to_params(&self) -> serde_json::Value {
        let mut filter = serde_json::json!({
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
            "topics": [self.topics0],
        });
        if !self.addresses.is_empty() {
            filter["address"] = serde_json::json!(self.addresses);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_log_deserializes_hex_quantities() {
        let json = serde_json::json!({
            "address": "0x0000000000000000000000000000000000000abc",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "blockNumber": "0x64",
            "blockHash": "0x01",
            "transactionHash": "0x02",
            "transactionIndex": "0x3",
            "logIndex": "0x1f",
        });
        let log: RpcLog = serde_json::from_value(json).unwrap();
        assert_eq!(log.block_number, 100);
        assert_eq!(log.transaction_index, 3);
        assert_eq!(log.log_index, 31);
        assert!(!log.removed);
    }

    #[rstest]
    fn test_error_response() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted"}}"#;
        let response: RpcNodeHttpResponse<String> = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, 3);
    }

    #[rstest]
    fn test_error_response_without_result_of_non_default_type() {
        let json = r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32000,"message":"header not found"}}"#;
        let response: RpcNodeHttpResponse<RpcLog> = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.id, 7);
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[rstest]
    fn test_filter_params() {
        let filter = LogFilter {
            from_block: 16,
            to_block: 31,
            topics0: vec!["0xaa".to_string()],
            addresses: Vec::new(),
        };
        let params = filter.to_params();
        assert_eq!(params["fromBlock"], "0x10");
        assert_eq!(params["toBlock"], "0x1f");
        assert_eq!(params["topics"][0][0], "0xaa");
        assert!(params.get("address").is_none());
    }
}
