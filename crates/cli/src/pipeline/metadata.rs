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

use std::{str::FromStr, sync::Arc};

use alloy_primitives::{Address, U256};
use nftsync_model::{ContractType, messages::MetadataSyncRequest};
use nftsync_pipeline::{
    PipelineContext, contracts::nft::detect_contract_type, metadata::MetadataResolver,
};

/// Parses the token arguments of a `resolve-metadata` command.
///
/// # Errors
///
/// Returns an error if the address, token id or contract type is malformed.
pub fn parse_token_args(
    address: &str,
    token_id: &str,
    contract_type: Option<&str>,
) -> anyhow::Result<(Address, U256, Option<ContractType>)> {
    let address = Address::from_str(address)
        .map_err(|e| anyhow::anyhow!("Invalid token address '{address}': {e}"))?;
    let token_id = U256::from_str_radix(token_id, 10)
        .map_err(|e| anyhow::anyhow!("Invalid token id '{token_id}': {e}"))?;
    let contract_type = contract_type
        .map(|value| {
            ContractType::from_str(value)
                .map_err(|_| anyhow::anyhow!("Invalid contract type '{value}'"))
        })
        .transpose()?;
    Ok((address, token_id, contract_type))
}

/// Resolves the metadata of one token and logs the outcome.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the contract type cannot be detected or a
/// backend fails.
pub async fn run_resolve_metadata(
    ctx: Arc<PipelineContext>,
    chain_id: u64,
    address: &str,
    token_id: &str,
    contract_type: Option<String>,
) -> anyhow::Result<()> {
    let (address, token_id, contract_type) =
        parse_token_args(address, token_id, contract_type.as_deref())?;

    let contract_type = match contract_type {
        Some(contract_type) => contract_type,
        None => {
            let client = ctx.rpc_pool(chain_id)?.select().client;
            detect_contract_type(client.as_ref(), &address)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!("{address} implements neither ERC-721 nor ERC-1155")
                })?
        }
    };

    let resolver = MetadataResolver::new(ctx)?;
    let request = MetadataSyncRequest::new(chain_id, address, token_id, contract_type);
    let outcome = resolver.process(request).await?;
    tracing::info!("Resolved {address} #{token_id} on chain {chain_id}: {outcome:?}");
    Ok(())
}
