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

//! Row decoders for the pipeline tables.
//!
//! Arbitrary-precision columns are `NUMERIC(78, 0)` and are selected as text.

use std::str::FromStr;

use alloy_primitives::{Address, U256};
use nftsync_model::{
    ContractType, Nft, OwnerBalance, Transfer, TransferStatus,
    messages::{PublishFailure, PublishFailureStatus},
};
use sqlx::{FromRow, Row, postgres::PgRow};

#[derive(Debug)]
pub struct TransferModel(pub Transfer);
#[derive(Debug)]
pub struct NftModel(pub Nft);
#[derive(Debug)]
pub struct OwnerBalanceModel(pub OwnerBalance);
#[derive(Debug)]
pub struct PublishFailureModel(pub PublishFailure);

fn decode_error(column: &str, e: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.to_string().into(),
    }
}

fn get_u64(row: &PgRow, column: &str) -> Result<u64, sqlx::Error> {
    let value = row.try_get::<i64, _>(column)?;
    u64::try_from(value).map_err(|e| decode_error(column, e))
}

fn get_opt_u64(row: &PgRow, column: &str) -> Result<Option<u64>, sqlx::Error> {
    row.try_get::<Option<i64>, _>(column)?
        .map(|v| u64::try_from(v).map_err(|e| decode_error(column, e)))
        .transpose()
}

fn get_u256(row: &PgRow, column: &str) -> Result<U256, sqlx::Error> {
    let value = row.try_get::<String, _>(column)?;
    U256::from_str_radix(&value, 10).map_err(|e| decode_error(column, e))
}

fn get_address(row: &PgRow, column: &str) -> Result<Address, sqlx::Error> {
    let value = row.try_get::<String, _>(column)?;
    Address::from_str(&value).map_err(|e| decode_error(column, e))
}

fn get_contract_type(row: &PgRow, column: &str) -> Result<ContractType, sqlx::Error> {
    let value = row.try_get::<String, _>(column)?;
    ContractType::from_str(&value).map_err(|e| decode_error(column, e))
}

impl<'r> FromRow<'r, PgRow> for TransferModel {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status = row.try_get::<i16, _>("status")?;
        let array_index = row.try_get::<i32, _>("array_index")?;
        Ok(Self(Transfer {
            chain_id: get_u64(row, "chain_id")?,
            block_number: get_u64(row, "block_number")?,
            block_hash: row.try_get("block_hash")?,
            block_timestamp: get_u64(row, "block_timestamp")?,
            transaction_hash: row.try_get("transaction_hash")?,
            transaction_index: get_u64(row, "transaction_index")?,
            log_index: get_u64(row, "log_index")?,
            array_index: u32::try_from(array_index).map_err(|e| decode_error("array_index", e))?,
            token_address: get_address(row, "token_address")?,
            token_id: get_u256(row, "token_id")?,
            from: get_address(row, "from_address")?,
            to: get_address(row, "to_address")?,
            amount: get_u256(row, "amount")?,
            contract_type: get_contract_type(row, "contract_type")?,
            transfer_hash: row.try_get("transfer_hash")?,
            status: TransferStatus::from_code(status).map_err(|e| decode_error("status", e))?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for NftModel {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let times = row.try_get::<i32, _>("sync_metadata_times")?;
        Ok(Self(Nft {
            chain_id: get_u64(row, "chain_id")?,
            token_address: get_address(row, "token_address")?,
            token_id: get_u256(row, "token_id")?,
            token_hash: row.try_get("token_hash")?,
            contract_type: get_contract_type(row, "contract_type")?,
            token_uri: row.try_get("token_uri")?,
            metadata: row.try_get("metadata")?,
            name: row.try_get("name")?,
            is_destroyed: row.try_get("is_destroyed")?,
            block_number_minted: get_opt_u64(row, "block_number_minted")?,
            block_number: get_u64(row, "block_number")?,
            sync_metadata_error: row.try_get("sync_metadata_error")?,
            sync_metadata_times: u32::try_from(times)
                .map_err(|e| decode_error("sync_metadata_times", e))?,
            last_sync_metadata_time: get_opt_u64(row, "last_sync_metadata_time")?,
            transfer_log_index: get_u64(row, "transfer_log_index")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for OwnerBalanceModel {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(OwnerBalance {
            chain_id: get_u64(row, "chain_id")?,
            token_hash: row.try_get("token_hash")?,
            owner: get_address(row, "owner")?,
            owner_hash: row.try_get("owner_hash")?,
            balance: get_u256(row, "balance")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for PublishFailureModel {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status = row.try_get::<i16, _>("status")?;
        Ok(Self(PublishFailure {
            id: Some(row.try_get("id")?),
            exchange: row.try_get("exchange")?,
            routing_key: row.try_get("routing_key")?,
            payload: row.try_get("payload")?,
            error_msg: row.try_get("error_msg")?,
            status: PublishFailureStatus::from_code(status)
                .map_err(|e| decode_error("status", e))?,
        }))
    }
}
