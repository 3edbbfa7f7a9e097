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

//! ERC-721 `Transfer` and ERC-1155 `TransferSingle` / `TransferBatch` log decoding.
//!
//! ERC-20 emits a `Transfer` event with the same signature but only three topics; such logs
//! are skipped rather than treated as errors.

use std::str::FromStr;

use alloy::{
    primitives::{Address, B256, U256},
    sol,
    sol_types::SolEvent,
};
use nftsync_model::{ContractType, Transfer as TokenTransfer};

use crate::rpc::types::RpcLog;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    event TransferSingle(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256 id,
        uint256 value
    );
    event TransferBatch(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256[] ids,
        uint256[] values
    );
}

/// Returns the signature hashes of all decoded transfer events, for log filters.
#[must_use]
pub fn transfer_event_topics() -> Vec<String> {
    [
        Transfer::SIGNATURE_HASH,
        TransferSingle::SIGNATURE_HASH,
        TransferBatch::SIGNATURE_HASH,
    ]
    .iter()
    .map(|hash| format!("{hash:#x}"))
    .collect()
}

/// The position and block context shared by every transfer decoded from one log.
#[derive(Debug, Clone)]
struct LogContext<'a> {
    chain_id: u64,
    log: &'a RpcLog,
    block_timestamp: u64,
    token_address: Address,
}

impl LogContext<'_> {
    fn transfer(
        &self,
        array_index: u32,
        token_id: U256,
        from: Address,
        to: Address,
        amount: U256,
        contract_type: ContractType,
    ) -> TokenTransfer {
        TokenTransfer::new(
            self.chain_id,
            self.log.block_number,
            self.log.block_hash.clone(),
            self.block_timestamp,
            self.log.transaction_hash.to_lowercase(),
            self.log.transaction_index,
            self.log.log_index,
            array_index,
            self.token_address,
            token_id,
            from,
            to,
            amount,
            contract_type,
        )
    }
}

fn parse_topics(log: &RpcLog) -> anyhow::Result<Vec<B256>> {
    log.topics
        .iter()
        .map(|topic| {
            B256::from_str(topic).map_err(|e| anyhow::anyhow!("Invalid topic '{topic}': {e}"))
        })
        .collect()
}

fn parse_data(log: &RpcLog) -> anyhow::Result<Vec<u8>> {
    let data = log.data.strip_prefix("0x").unwrap_or(&log.data);
    hex::decode(data).map_err(|e| anyhow::anyhow!("Invalid log data: {e}"))
}

/// Decodes the transfers carried by one log.
///
/// Returns an empty list for logs that are not NFT transfers. A `TransferBatch` yields one
/// transfer per batch position, numbered by `array_index`.
///
/// # Errors
///
/// Returns an error if a recognized event cannot be decoded.
pub fn decode_transfer_log(
    chain_id: u64,
    log: &RpcLog,
    block_timestamp: u64,
) -> anyhow::Result<Vec<TokenTransfer>> {
    if log.removed {
        return Ok(Vec::new());
    }
    let topics = parse_topics(log)?;
    let Some(signature) = topics.first() else {
        return Ok(Vec::new());
    };
    let ctx = LogContext {
        chain_id,
        log,
        block_timestamp,
        token_address: Address::from_str(&log.address)
            .map_err(|e| anyhow::anyhow!("Invalid log address '{}': {e}", log.address))?,
    };

    if *signature == Transfer::SIGNATURE_HASH {
        if topics.len() != 4 {
            return Ok(Vec::new());
        }
        let event = Transfer::decode_raw_log(topics.iter().copied(), &[])
            .map_err(|e| anyhow::anyhow!("Failed to decode Transfer: {e}"))?;
        return Ok(vec![ctx.transfer(
            0,
            event.tokenId,
            event.from,
            event.to,
            U256::from(1),
            ContractType::Erc721,
        )]);
    }

    if *signature == TransferSingle::SIGNATURE_HASH {
        let event = TransferSingle::decode_raw_log(topics.iter().copied(), &parse_data(log)?)
            .map_err(|e| anyhow::anyhow!("Failed to decode TransferSingle: {e}"))?;
        return Ok(vec![ctx.transfer(
            0,
            event.id,
            event.from,
            event.to,
            event.value,
            ContractType::Erc1155,
        )]);
    }

    if *signature == TransferBatch::SIGNATURE_HASH {
        let event = TransferBatch::decode_raw_log(topics.iter().copied(), &parse_data(log)?)
            .map_err(|e| anyhow::anyhow!("Failed to decode TransferBatch: {e}"))?;
        if event.ids.len() != event.values.len() {
            anyhow::bail!(
                "TransferBatch in {} has {} ids but {} values",
                log.transaction_hash,
                event.ids.len(),
                event.values.len()
            );
        }
        return event
            .ids
            .iter()
            .zip(&event.values)
            .enumerate()
            .map(|(index, (id, value))| {
                Ok(ctx.transfer(
                    u32::try_from(index)?,
                    *id,
                    event.from,
                    event.to,
                    *value,
                    ContractType::Erc1155,
                ))
            })
            .collect();
    }

    Ok(Vec::new())
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy::sol_types::SolValue;
    use nftsync_model::stubs::{STUB_OWNER_A, STUB_OWNER_B, STUB_TOKEN_ADDRESS};
    use rstest::rstest;

    use super::*;

    fn topic_for(address: Address) -> String {
        format!("{:#x}", address.into_word())
    }

    fn word(value: U256) -> String {
        format!("{:#x}", B256::from(value.to_be_bytes::<32>()))
    }

    fn base_log(topics: Vec<String>, data: Vec<u8>) -> RpcLog {
        RpcLog {
            address: STUB_TOKEN_ADDRESS.to_string(),
            topics,
            data: format!("0x{}", hex::encode(data)),
            block_number: 100,
            block_hash: "0xbb".to_string(),
            transaction_hash: "0xAA".to_string(),
            transaction_index: 2,
            log_index: 5,
            removed: false,
        }
    }

    /// Builds an ERC-721 `Transfer` log.
    pub(crate) fn erc721_log(from: Address, to: Address, token_id: u64) -> RpcLog {
        base_log(
            vec![
                format!("{:#x}", Transfer::SIGNATURE_HASH),
                topic_for(from),
                topic_for(to),
                word(U256::from(token_id)),
            ],
            Vec::new(),
        )
    }

    #[rstest]
    fn test_decode_erc721_transfer() {
        let transfers = decode_transfer_log(1, &erc721_log(STUB_OWNER_A, STUB_OWNER_B, 42), 1_700)
            .unwrap();
        assert_eq!(transfers.len(), 1);
        let transfer = &transfers[0];
        assert_eq!(transfer.token_id, U256::from(42));
        assert_eq!(transfer.from, STUB_OWNER_A);
        assert_eq!(transfer.to, STUB_OWNER_B);
        assert_eq!(transfer.amount, U256::from(1));
        assert_eq!(transfer.contract_type, ContractType::Erc721);
        assert_eq!(transfer.transaction_hash, "0xaa");
        assert_eq!(transfer.block_timestamp, 1_700);
    }

    #[rstest]
    fn test_erc20_transfer_is_skipped() {
        let mut log = erc721_log(STUB_OWNER_A, STUB_OWNER_B, 42);
        log.topics.pop();
        log.data = word(U256::from(1_000));
        assert!(decode_transfer_log(1, &log, 0).unwrap().is_empty());
    }

    #[rstest]
    fn test_decode_transfer_single() {
        let data = (U256::from(9), U256::from(3)).abi_encode_params();
        let log = base_log(
            vec![
                format!("{:#x}", TransferSingle::SIGNATURE_HASH),
                topic_for(STUB_OWNER_A),
                topic_for(Address::ZERO),
                topic_for(STUB_OWNER_B),
            ],
            data,
        );
        let transfers = decode_transfer_log(56, &log, 0).unwrap();
        assert_eq!(transfers.len(), 1);
        assert!(transfers[0].is_mint());
        assert_eq!(transfers[0].amount, U256::from(3));
        assert_eq!(transfers[0].contract_type, ContractType::Erc1155);
    }

    #[rstest]
    fn test_decode_transfer_batch_numbers_positions() {
        let ids = vec![U256::from(1), U256::from(2), U256::from(3)];
        let values = vec![U256::from(10), U256::from(20), U256::from(30)];
        let data = (ids, values).abi_encode_params();
        let log = base_log(
            vec![
                format!("{:#x}", TransferBatch::SIGNATURE_HASH),
                topic_for(STUB_OWNER_A),
                topic_for(STUB_OWNER_A),
                topic_for(STUB_OWNER_B),
            ],
            data,
        );
        let transfers = decode_transfer_log(56, &log, 0).unwrap();
        assert_eq!(transfers.len(), 3);
        assert_eq!(
            transfers.iter().map(|t| t.array_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(transfers[2].token_id, U256::from(3));
        assert_eq!(transfers[2].amount, U256::from(30));

        let hashes: std::collections::HashSet<_> =
            transfers.iter().map(|t| t.transfer_hash.clone()).collect();
        assert_eq!(hashes.len(), 3);
    }

    #[rstest]
    fn test_removed_log_is_skipped() {
        let mut log = erc721_log(STUB_OWNER_A, STUB_OWNER_B, 1);
        log.removed = true;
        assert!(decode_transfer_log(1, &log, 0).unwrap().is_empty());
    }

    #[rstest]
    fn test_topics_cover_all_events() {
        assert_eq!(transfer_event_topics().len(), 3);
        assert_eq!(
            transfer_event_topics()[0],
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }
}
