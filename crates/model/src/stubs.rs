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

//! Type stubs to facilitate testing.

use alloy_primitives::{Address, U256, address};
use rstest::fixture;

use crate::{
    chain::{Blockchain, Chain, RpcEndpoint},
    contract::ContractType,
    nft::Nft,
    transfer::Transfer,
};

/// The contract address used throughout the stubs.
pub const STUB_TOKEN_ADDRESS: Address = address!("0x0000000000000000000000000000000000000abc");

/// An owner address distinct from the zero address.
pub const STUB_OWNER_A: Address = address!("0x00000000000000000000000000000000000000a1");

/// A second owner address.
pub const STUB_OWNER_B: Address = address!("0x00000000000000000000000000000000000000b2");

#[fixture]
pub fn stub_chain() -> Chain {
    Chain::new(
        Blockchain::Ethereum,
        1,
        vec![
            RpcEndpoint::new("http://127.0.0.1:8545", 1),
            RpcEndpoint::new("http://127.0.0.1:8546", 1),
        ],
        100,
    )
}

#[fixture]
pub fn stub_nft() -> Nft {
    Nft::new(
        1,
        STUB_TOKEN_ADDRESS,
        U256::from(42),
        ContractType::Erc721,
        100,
        0,
    )
}

/// Returns an ERC-721 transfer of `token_id` in block 100 at log index `token_id`.
#[must_use]
pub fn stub_transfer(from: Address, to: Address, token_id: u64) -> Transfer {
    stub_transfer_at(from, to, token_id, 100, token_id)
}

/// Returns an ERC-721 transfer of `token_id` at the given block and log position.
#[must_use]
pub fn stub_transfer_at(
    from: Address,
    to: Address,
    token_id: u64,
    block_number: u64,
    log_index: u64,
) -> Transfer {
    Transfer::new(
        1,
        block_number,
        format!("0x{block_number:064x}"),
        1_700_000_000 + block_number,
        format!("0x{:062x}{log_index:02x}", block_number),
        0,
        log_index,
        0,
        STUB_TOKEN_ADDRESS,
        U256::from(token_id),
        from,
        to,
        U256::from(1),
        ContractType::Erc721,
    )
}
