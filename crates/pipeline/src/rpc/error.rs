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

use nftsync_network::http::HttpClientError;
use thiserror::Error;

/// JSON-RPC error code used by nodes for reverted calls.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Represents errors that can occur when interacting with a blockchain RPC client.
#[derive(Debug, Error)]
pub enum BlockchainRpcClientError {
    /// The transport failed before a response was received.
    #[error("Client error: {0}")]
    ClientError(String),
    /// The request did not complete within its timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// The node answered with a non-success HTTP status.
    #[error("Node returned HTTP {0}")]
    HttpStatus(u16),
    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },
    /// The contract call reverted or returned no data.
    #[error("Execution reverted: {0}")]
    Reverted(String),
    /// Occurs when input parameters to an RPC call are invalid.
    #[error("Invalid RPC parameters: {0}")]
    InvalidParameters(String),
    /// Occurs when decoding contract ABI data fails.
    #[error("Decoding error: {0}")]
    AbiDecodingError(String),
    /// Occurs when parsing an RPC message fails.
    #[error("Parsing error: {0}")]
    MessageParsingError(String),
}

impl BlockchainRpcClientError {
    /// Returns `true` for failures worth retrying later: timeouts, network errors and 5xx.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::ClientError(_) | Self::Timeout(_) => true,
            Self::HttpStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` when the call reverted, which for token URI lookups means the token does
    /// not exist.
    #[must_use]
    pub const fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

impl From<HttpClientError> for BlockchainRpcClientError {
    fn from(e: HttpClientError) -> Self {
        match e {
            HttpClientError::TimeoutError(msg) => Self::Timeout(msg),
            HttpClientError::InvalidRequest(msg) => Self::InvalidParameters(msg),
            HttpClientError::ConnectError(msg) | HttpClientError::Error(msg) => {
                Self::ClientError(msg)
            }
        }
    }
}
