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

use alloy::{
    primitives::{Address, FixedBytes, U256},
    sol,
    sol_types::SolCall,
};
use nftsync_model::ContractType;

use crate::rpc::{BlockchainRpcClient, error::BlockchainRpcClientError};

sol! {
    contract NftContract {
        function tokenURI(uint256 tokenId) external view returns (string memory);
        function uri(uint256 id) external view returns (string memory);
        function supportsInterface(bytes4 interfaceId) external view returns (bool);
    }
}

/// Returns the metadata URI of a token as reported by its contract.
///
/// ERC-721 contracts are asked for `tokenURI(uint256)`, ERC-1155 contracts for `uri(uint256)`.
///
/// # Errors
///
/// Returns [`BlockchainRpcClientError::Reverted`] if the token does not exist, or any other
/// error of the call or the ABI decoding.
pub async fn fetch_token_uri(
    client: &dyn BlockchainRpcClient,
    contract: &Address,
    token_id: U256,
    contract_type: ContractType,
) -> Result<String, BlockchainRpcClientError> {
    match contract_type {
        ContractType::Erc721 => {
            let call_data = NftContract::tokenURICall { tokenId: token_id }.abi_encode();
            let raw = client.eth_call(contract, &call_data).await?;
            NftContract::tokenURICall::abi_decode_returns(&raw).map_err(|e| {
                BlockchainRpcClientError::AbiDecodingError(format!(
                    "Failed to decode tokenURI of {contract}: {e}"
                ))
            })
        }
        ContractType::Erc1155 => {
            let call_data = NftContract::uriCall { id: token_id }.abi_encode();
            let raw = client.eth_call(contract, &call_data).await?;
            NftContract::uriCall::abi_decode_returns(&raw).map_err(|e| {
                BlockchainRpcClientError::AbiDecodingError(format!(
                    "Failed to decode uri of {contract}: {e}"
                ))
            })
        }
    }
}

/// Asks a contract whether it implements `interface_id` through ERC-165.
///
/// A reverting call means the contract does not implement ERC-165 and reports `false`.
///
/// # Errors
///
/// Returns an error for transport failures or undecodable return data.
pub async fn supports_interface(
    client: &dyn BlockchainRpcClient,
    contract: &Address,
    interface_id: [u8; 4],
) -> Result<bool, BlockchainRpcClientError> {
    let call_data = NftContract::supportsInterfaceCall {
        interfaceId: FixedBytes(interface_id),
    }
    .abi_encode();
    match client.eth_call(contract, &call_data).await {
        Ok(raw) => NftContract::supportsInterfaceCall::abi_decode_returns(&raw).map_err(|e| {
            BlockchainRpcClientError::AbiDecodingError(format!(
                "Failed to decode supportsInterface of {contract}: {e}"
            ))
        }),
        Err(BlockchainRpcClientError::Reverted(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Detects the token standard of a contract, `None` when it is neither ERC-721 nor ERC-1155.
///
/// # Errors
///
/// Returns an error for transport failures.
pub async fn detect_contract_type(
    client: &dyn BlockchainRpcClient,
    contract: &Address,
) -> Result<Option<ContractType>, BlockchainRpcClientError> {
    for contract_type in [ContractType::Erc721, ContractType::Erc1155] {
        if supports_interface(client, contract, contract_type.interface_id()).await? {
            return Ok(Some(contract_type));
        }
    }
    Ok(None)
}
