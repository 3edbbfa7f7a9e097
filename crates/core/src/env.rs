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

//! Environment variable helpers.
//!
//! Values are parsed strictly through [`FromStr`]: a variable that is set but malformed is an
//! error, never silently coerced or defaulted.

use std::{fmt::Display, str::FromStr};

/// Returns the environment variable for the given `key`.
///
/// # Errors
///
/// Returns an error if the environment variable is not set.
pub fn get_env_var(key: &str) -> anyhow::Result<String> {
    match std::env::var(key) {
        Ok(var) => Ok(var),
        Err(_) => anyhow::bail!("environment variable '{key}' must be set"),
    }
}

/// Returns the environment variable for the given `key` if set and non-empty.
#[must_use]
pub fn get_env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parses the environment variable for the given `key` into `T`.
///
/// Returns `Ok(None)` when the variable is unset or empty.
///
/// # Errors
///
/// Returns an error if the variable is set but cannot be parsed as `T`.
pub fn parse_env_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match get_env_var_opt(key) {
        Some(raw) => parse_value(key, &raw).map(Some),
        None => Ok(None),
    }
}

/// Parses a raw configuration `value` named `key` into `T`.
///
/// # Errors
///
/// Returns an error naming `key` if the value cannot be parsed.
pub fn parse_value<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value '{value}' for '{key}': {e}"))
}

/// Parses a boolean flag accepting `true`, `false`, `1` and `0` (case-insensitive).
///
/// # Errors
///
/// Returns an error if the value is not one of the accepted spellings.
pub fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => anyhow::bail!("invalid boolean '{other}' for '{key}'"),
    }
}

/// Parses a comma separated list of values (e.g. `1,56,137`), ignoring blank items.
///
/// # Errors
///
/// Returns an error if any item cannot be parsed as `T`.
pub fn parse_list<T>(key: &str, value: &str) -> anyhow::Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_value(key, item))
        .collect()
}
