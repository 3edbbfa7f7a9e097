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

//! Token URI normalization and data URI decoding.

use alloy_primitives::U256;
use base64::prelude::*;
use nftsync_common::config::MetadataConfig;
use url::Url;

/// Token URI stored in place of an inline data URI.
pub const DATA_URI_PLACEHOLDER: &str = "base64 data";

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";
const IPFS_SCHEME: &str = "ipfs://";
const ARWEAVE_SCHEME: &str = "ar://";

/// Rewrites contract-reported token URIs into fetchable form.
#[derive(Debug, Clone)]
pub struct UriNormalizer {
    ipfs_gateway: String,
    arweave_gateway: String,
}

impl UriNormalizer {
    /// Creates a new [`UriNormalizer`] rewriting to the given gateway prefixes.
    #[must_use]
    pub fn new(ipfs_gateway: impl Into<String>, arweave_gateway: impl Into<String>) -> Self {
        Self {
            ipfs_gateway: ipfs_gateway.into(),
            arweave_gateway: arweave_gateway.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &MetadataConfig) -> Self {
        Self::new(config.ipfs_gateway.clone(), config.arweave_gateway.clone())
    }

    /// Strips NUL characters, substitutes the `{id}` placeholder with the decimal token id and
    /// rewrites `ipfs://` and `ar://` URIs to their HTTPS gateways.
    #[must_use]
    pub fn normalize(&self, uri: &str, token_id: &U256) -> String {
        let uri = uri.replace('\0', "").replace("{id}", &token_id.to_string());
        let uri = uri.trim();

        if let Some(path) = uri.strip_prefix(IPFS_SCHEME) {
            let path = path.strip_prefix("ipfs/").unwrap_or(path);
            format!("{}{path}", self.ipfs_gateway)
        } else if let Some(path) = uri.strip_prefix(ARWEAVE_SCHEME) {
            format!("{}{path}", self.arweave_gateway)
        } else {
            uri.to_string()
        }
    }
}

/// Returns `true` if `value` is an inline data URI of any encoding.
#[must_use]
pub fn is_data_uri(value: &str) -> bool {
    value
        .get(..DATA_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(DATA_SCHEME))
}

/// Returns `true` if `value` is a base64-encoded data URI (`data:<type>;base64,<payload>`).
#[must_use]
pub fn is_base64_data_uri(value: &str) -> bool {
    is_data_uri(value)
        && value[DATA_SCHEME.len()..]
            .split_once(',')
            .is_some_and(|(header, _)| {
                header.len() > BASE64_MARKER.len()
                    && header.to_ascii_lowercase().ends_with(BASE64_MARKER)
            })
}

/// The decoded content of a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Decodes a base64 or percent-encoded data URI.
///
/// Returns `None` if `value` is not a data URI or its payload does not decode.
#[must_use]
pub fn decode_data_uri(value: &str) -> Option<DataUri> {
    if !is_data_uri(value) {
        return None;
    }
    let (header, payload) = value[DATA_SCHEME.len()..].split_once(',')?;

    let (media_type, data) = match header
        .len()
        .checked_sub(BASE64_MARKER.len())
        .filter(|&split| {
            header
                .get(split..)
                .is_some_and(|marker| marker.eq_ignore_ascii_case(BASE64_MARKER))
        })
    {
        Some(split) => {
            let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            let data = BASE64_STANDARD
                .decode(compact.as_bytes())
                .or_else(|_| BASE64_STANDARD_NO_PAD.decode(compact.trim_end_matches('=')))
                .ok()?;
            (&header[..split], data)
        }
        None => (header, urlencoding::decode_binary(payload.as_bytes()).into_owned()),
    };

    let media_type = media_type.split(';').next().unwrap_or_default().trim();
    Some(DataUri {
        media_type: if media_type.is_empty() {
            "text/plain".to_string()
        } else {
            media_type.to_ascii_lowercase()
        },
        data,
    })
}

/// Returns `true` if `uri` is a well-formed HTTP(S) URL worth fetching.
#[must_use]
pub fn is_fetchable_url(uri: &str) -> bool {
    Url::parse(uri).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn normalizer() -> UriNormalizer {
        UriNormalizer::from_config(&MetadataConfig::default())
    }

    #[rstest]
    #[case("ipfs://QmHash/{id}.json", "https://cloudflare-ipfs.com/ipfs/QmHash/42.json")]
    #[case("ipfs://ipfs/QmHash", "https://cloudflare-ipfs.com/ipfs/QmHash")]
    #[case("ar://tx-id", "https://arweave.net/tx-id")]
    #[case("https://api.example.com/{id}\0\0", "https://api.example.com/42")]
    #[case("https://api.example.com/token/1", "https://api.example.com/token/1")]
    fn test_normalize(normalizer: UriNormalizer, #[case] uri: &str, #[case] expected: &str) {
        assert_eq!(normalizer.normalize(uri, &U256::from(42)), expected);
    }

    #[rstest]
    #[case("data:application/json;base64,e30=", true, true)]
    #[case("DATA:application/json;BASE64,e30=", true, true)]
    #[case("data:application/json,%7B%7D", true, false)]
    #[case("data:;base64", true, false)]
    #[case("https://example.com/data:;base64,", false, false)]
    fn test_data_uri_detection(
        #[case] value: &str,
        #[case] data_uri: bool,
        #[case] base64: bool,
    ) {
        assert_eq!(is_data_uri(value), data_uri);
        assert_eq!(is_base64_data_uri(value), base64);
    }

    #[rstest]
    fn test_decode_base64_data_uri() {
        let decoded = decode_data_uri("data:application/json;base64,eyJuYW1lIjoiWCJ9").unwrap();
        assert_eq!(decoded.media_type, "application/json");
        assert_eq!(decoded.data, br#"{"name":"X"}"#);
    }

    #[rstest]
    fn test_decode_percent_encoded_data_uri() {
        let decoded = decode_data_uri("data:application/json;utf8,%7B%22a%22%3A1%7D").unwrap();
        assert_eq!(decoded.media_type, "application/json");
        assert_eq!(decoded.data, br#"{"a":1}"#);
    }

    #[rstest]
    fn test_decode_invalid_base64_is_none() {
        assert!(decode_data_uri("data:image/png;base64,@@@").is_none());
        assert!(decode_data_uri("https://example.com").is_none());
    }

    #[rstest]
    #[case("https://example.com/1.json", true)]
    #[case("http://127.0.0.1:8080/meta", true)]
    #[case("ftp://example.com/1.json", false)]
    #[case("not a url", false)]
    #[case("", false)]
    fn test_is_fetchable_url(#[case] uri: &str, #[case] expected: bool) {
        assert_eq!(is_fetchable_url(uri), expected);
    }
}
