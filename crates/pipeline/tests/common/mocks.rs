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

//! A scriptable in-memory chain node.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy::{
    primitives::{Address, U256},
    sol_types::{SolCall, SolValue},
};
use async_trait::async_trait;
use nftsync_pipeline::{
    contracts::nft::NftContract,
    events::transfer::transfer_event_topics,
    rpc::{
        BlockchainRpcClient,
        error::BlockchainRpcClientError,
        types::{LogFilter, RpcBlockHeader, RpcLog},
    },
};

/// The scripted answer to a token URI call.
#[derive(Debug, Clone)]
pub enum TokenUriReply {
    Uri(String),
    Revert,
    Timeout,
}

#[derive(Debug, Default)]
struct MockChainState {
    head: u64,
    head_status: Option<u16>,
    logs: Vec<RpcLog>,
    token_uris: HashMap<U256, TokenUriReply>,
}

/// A [`BlockchainRpcClient`] answering from scripted state and counting contract calls.
#[derive(Debug, Default)]
pub struct MockRpcClient {
    state: Mutex<MockChainState>,
    eth_calls: AtomicUsize,
    log_queries: AtomicUsize,
}

impl MockRpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    /// Answers `eth_blockNumber` with an HTTP `status` until cleared with `None`.
    pub fn fail_head(&self, status: Option<u16>) {
        self.state.lock().unwrap().head_status = status;
    }

    pub fn push_log(&self, log: RpcLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn set_token_uri(&self, token_id: u64, reply: TokenUriReply) {
        self.state
            .lock()
            .unwrap()
            .token_uris
            .insert(U256::from(token_id), reply);
    }

    pub fn eth_call_count(&self) -> usize {
        self.eth_calls.load(Ordering::SeqCst)
    }

    pub fn log_query_count(&self) -> usize {
        self.log_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockchainRpcClient for MockRpcClient {
    fn node(&self) -> &str {
        "mock://node"
    }

    async fn block_number(&self) -> Result<u64, BlockchainRpcClientError> {
        let state = self.state.lock().unwrap();
        match state.head_status {
            Some(status) => Err(BlockchainRpcClientError::HttpStatus(status)),
            None => Ok(state.head),
        }
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, BlockchainRpcClientError> {
        self.log_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|log| (filter.from_block..=filter.to_block).contains(&log.block_number))
            .cloned()
            .collect())
    }

    async fn get_block_header(
        &self,
        block_number: u64,
    ) -> Result<RpcBlockHeader, BlockchainRpcClientError> {
        Ok(RpcBlockHeader {
            number: Some(block_number),
            hash: Some(format!("0x{block_number:064x}")),
            timestamp: 1_700_000_000 + block_number,
        })
    }

    async fn eth_call(
        &self,
        _to: &Address,
        call_data: &[u8],
    ) -> Result<Vec<u8>, BlockchainRpcClientError> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        if call_data.len() < 36 || call_data[..4] != NftContract::tokenURICall::SELECTOR {
            return Err(BlockchainRpcClientError::Reverted("unknown selector".to_string()));
        }
        let token_id = U256::from_be_slice(&call_data[4..36]);
        let reply = self.state.lock().unwrap().token_uris.get(&token_id).cloned();
        match reply {
            Some(TokenUriReply::Uri(uri)) => Ok((uri,).abi_encode_params()),
            Some(TokenUriReply::Timeout) => Err(BlockchainRpcClientError::Timeout(
                "mock node timed out".to_string(),
            )),
            Some(TokenUriReply::Revert) | None => Err(BlockchainRpcClientError::Reverted(
                "execution reverted: nonexistent token".to_string(),
            )),
        }
    }
}

fn address_topic(address: &Address) -> String {
    format!("0x{:0>64}", hex::encode(address))
}

/// Returns an ERC-721 `Transfer` log of `token_id` at the given position.
pub fn transfer_log(
    block_number: u64,
    log_index: u64,
    from: &Address,
    to: &Address,
    token_address: &Address,
    token_id: u64,
) -> RpcLog {
    RpcLog {
        address: format!("{token_address:#x}"),
        topics: vec![
            transfer_event_topics()[0].clone(),
            address_topic(from),
            address_topic(to),
            format!("0x{token_id:064x}"),
        ],
        data: "0x".to_string(),
        block_number,
        block_hash: format!("0x{block_number:064x}"),
        transaction_hash: format!("0x{:060x}{log_index:04x}", block_number),
        transaction_index: 0,
        log_index,
        removed: false,
    }
}
