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

//! Explicit parsing and validation of externally supplied identifiers.

use std::str::FromStr;

use alloy_primitives::{Address, U256};

/// Returns the canonical lowercase `0x`-prefixed form of `address` used in hashes and keys.
#[must_use]
pub fn address_key(address: &Address) -> String {
    address.to_string().to_lowercase()
}

/// Parses and validates a 20-byte hex contract or account address.
///
/// # Errors
///
/// Returns an error if `value` is not a `0x`-prefixed 40 digit hex string.
pub fn validate_address(value: &str) -> anyhow::Result<Address> {
    let value = value.trim();
    if !value.starts_with("0x") || value.len() != 42 {
        anyhow::bail!("Invalid address '{value}': expected 0x followed by 40 hex digits");
    }
    Address::from_str(value).map_err(|e| anyhow::anyhow!("Invalid address '{value}': {e}"))
}

/// Parses a token id given either in decimal or as a `0x`-prefixed hex string.
///
/// # Errors
///
/// Returns an error if `value` is empty or not a valid unsigned 256-bit integer.
pub fn parse_token_id(value: &str) -> anyhow::Result<U256> {
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("Token id must not be empty");
    }
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|e| anyhow::anyhow!("Invalid token id '{value}': {e}"))
}
