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

//! Contract-level attributes and downstream subscribers.

use std::collections::HashMap;

use nftsync_cryptography::digest::md5_concat;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// ERC-165 interface id of ERC-721.
pub const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];

/// ERC-165 interface id of ERC-1155.
pub const ERC1155_INTERFACE_ID: [u8; 4] = [0xd9, 0xb6, 0x7a, 0x26];

/// The token standard a contract implements.
#[derive(
    Debug,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum ContractType {
    #[strum(serialize = "ERC721")]
    #[serde(rename = "ERC721")]
    Erc721,
    #[strum(serialize = "ERC1155")]
    #[serde(rename = "ERC1155")]
    Erc1155,
}

impl ContractType {
    /// Returns the ERC-165 interface id identifying this standard.
    #[must_use]
    pub const fn interface_id(self) -> [u8; 4] {
        match self {
            Self::Erc721 => ERC721_INTERFACE_ID,
            Self::Erc1155 => ERC1155_INTERFACE_ID,
        }
    }
}

/// Field name of the quarantine flag in the contract attribute hash.
pub const FIELD_NO_METADATA: &str = "no_metadata";

/// Field name of the static token URI prefix in the contract attribute hash.
pub const FIELD_TOKEN_URI_PREFIX: &str = "token_uri_prefix";

/// Per-contract attributes controlling metadata resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAttributes {
    /// Quarantine flag: no further metadata sync for any token of the contract.
    pub no_metadata: bool,
    /// Static prefix the token id is appended to instead of calling the contract.
    pub token_uri_prefix: Option<String>,
}

impl ContractAttributes {
    /// Builds attributes from the raw string fields of the key-value hash.
    ///
    /// Unknown fields are ignored; `no_metadata` is set for `"1"` or `"true"`.
    #[must_use]
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let no_metadata = fields
            .get(FIELD_NO_METADATA)
            .is_some_and(|v| matches!(v.trim(), "1" | "true"));
        let token_uri_prefix = fields
            .get(FIELD_TOKEN_URI_PREFIX)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self {
            no_metadata,
            token_uri_prefix,
        }
    }

    /// Returns the attributes as raw string fields for the key-value hash.
    #[must_use]
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![(
            FIELD_NO_METADATA.to_string(),
            if self.no_metadata { "1" } else { "0" }.to_string(),
        )];
        if let Some(prefix) = &self.token_uri_prefix {
            fields.push((FIELD_TOKEN_URI_PREFIX.to_string(), prefix.clone()));
        }
        fields
    }
}

/// A downstream system subscribed to updates for one or more contracts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// The subscriber identifier registered against contracts.
    pub source: String,
    /// The shared secret used to sign routing keys.
    pub secret: String,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Subscriber))
            .field("source", &self.source)
            .field("secret", &"***")
            .finish()
    }
}

impl Subscriber {
    /// Creates a new [`Subscriber`] instance.
    #[must_use]
    pub fn new(source: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            secret: secret.into(),
        }
    }

    /// Returns the signed routing key for `action` on `chain_id`.
    ///
    /// The key is the MD5 digest of source, secret, action and chain id concatenated, which
    /// lets the subscriber verify the message was routed by a holder of the shared secret.
    #[must_use]
    pub fn routing_key(&self, action: &str, chain_id: u64) -> String {
        md5_concat(&[&self.source, &self.secret, action, &chain_id.to_string()])
    }
}
