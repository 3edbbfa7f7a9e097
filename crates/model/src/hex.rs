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

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer};

/// Custom deserializer function for hex numbers.
pub fn deserialize_hex_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let hex_string = String::deserialize(deserializer)?;
    parse_hex_u64(&hex_string).map_err(serde::de::Error::custom)
}

/// Custom deserializer function for optional hex numbers (pending blocks report `null`).
pub fn deserialize_opt_hex_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| parse_hex_u64(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Parses a `0x`-prefixed hex quantity into a `u64`.
///
/// # Errors
///
/// Returns an error if the digits are not valid hex or overflow `u64`.
pub fn parse_hex_u64(value: &str) -> Result<u64, std::num::ParseIntError> {
    let without_prefix = value.trim_start_matches("0x");
    u64::from_str_radix(without_prefix, 16)
}

/// Parses a 32-byte big-endian hex word into a `U256`.
///
/// # Errors
///
/// Returns an error if the digits are not valid hex or exceed 256 bits.
pub fn parse_hex_u256(value: &str) -> anyhow::Result<U256> {
    let without_prefix = value.trim_start_matches("0x");
    if without_prefix.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(without_prefix, 16)
        .map_err(|e| anyhow::anyhow!("Invalid hex word '{value}': {e}"))
}
