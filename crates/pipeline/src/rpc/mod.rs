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

//! JSON-RPC access to blockchain nodes.
//!
//! [`BlockchainRpcClient`] is the seam the sync engine and contract calls go through;
//! [`http::BlockchainHttpRpcClient`] implements it over HTTP and [`pool::RpcPool`] spreads calls
//! over a chain's weighted endpoint pool.

use std::fmt::Debug;

use alloy_primitives::Address;

use crate::rpc::{
    error::BlockchainRpcClientError,
    types::{LogFilter, RpcBlockHeader, RpcLog},
};

pub mod error;
pub mod http;
pub mod pool;
pub mod types;

#[async_trait::async_trait]
pub trait BlockchainRpcClient: Debug + Send + Sync {
    /// Returns the node this client talks to, used in logs and error records.
    fn node(&self) -> &str;

    /// Returns the latest block number.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    async fn block_number(&self) -> Result<u64, BlockchainRpcClientError>;

    /// Returns the logs matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, BlockchainRpcClientError>;

    /// Returns the header of a block.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the block is unknown.
    async fn get_block_header(
        &self,
        block_number: u64,
    ) -> Result<RpcBlockHeader, BlockchainRpcClientError>;

    /// Executes a read-only contract call at the latest block and returns the raw return data.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainRpcClientError::Reverted`] if the call reverts or returns no data.
    async fn eth_call(
        &self,
        to: &Address,
        call_data: &[u8],
    ) -> Result<Vec<u8>, BlockchainRpcClientError>;
}
