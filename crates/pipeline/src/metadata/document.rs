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

//! Pure transforms over metadata documents.

use alloy_primitives::{Address, U256};
use nftsync_model::validation::address_key;
use serde_json::{Map, Value};

use super::uri::{DataUri, decode_data_uri, is_base64_data_uri};

const IMAGE_FIELD: &str = "image";
const NAME_FIELD: &str = "name";

/// Parses a fetched or decoded body into a metadata document.
///
/// Malformed input yields an empty document rather than an error.
#[must_use]
pub fn parse_document(body: &[u8]) -> Value {
    serde_json::from_slice::<Value>(body).map_or_else(|_| empty_document(), coerce_document)
}

/// Reduces a JSON value to an object document.
///
/// Arrays descend to their first element and strings are parsed once more as JSON; anything
/// else becomes an empty document.
#[must_use]
pub fn coerce_document(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        Value::Array(items) => items
            .into_iter()
            .next()
            .map_or_else(empty_document, coerce_document),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::String(_)) | Err(_) => empty_document(),
            Ok(inner) => coerce_document(inner),
        },
        _ => empty_document(),
    }
}

#[must_use]
pub fn empty_document() -> Value {
    Value::Object(Map::new())
}

/// Returns `true` if `document` carries no fields.
#[must_use]
pub fn is_empty_document(document: &Value) -> bool {
    match document {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// Extracts the display name of a document, stripping NULs and stringifying non-string names.
#[must_use]
pub fn extract_name(document: &Value) -> Option<String> {
    match document.get(NAME_FIELD)? {
        Value::Null => None,
        Value::String(name) => Some(name.replace('\0', "")),
        other => Some(other.to_string()),
    }
}

/// Returns the decoded top-level inline image of `document`, if it holds a base64 data URI.
#[must_use]
pub fn inline_image(document: &Value) -> Option<DataUri> {
    document
        .get(IMAGE_FIELD)
        .and_then(Value::as_str)
        .filter(|image| is_base64_data_uri(image))
        .and_then(decode_data_uri)
}

/// Returns the object store key of a token's uploaded image.
#[must_use]
pub fn image_key(chain_id: u64, token_address: &Address, token_id: &U256) -> String {
    format!("{chain_id}/{}/{token_id}", address_key(token_address)).to_lowercase()
}

/// Removes inline base64 payloads from `document`.
///
/// A top-level inline `image` is replaced by `image_url` when given; every other base64 data
/// URI string at any depth is replaced by an empty string.
#[must_use]
pub fn scrub_inline_data(mut document: Value, image_url: Option<String>) -> Value {
    if let (Some(url), Some(image)) = (image_url, document.get_mut(IMAGE_FIELD))
        && image.as_str().is_some_and(is_base64_data_uri)
    {
        *image = Value::String(url);
    }
    scrub(&mut document);
    document
}

fn scrub(value: &mut Value) {
    match value {
        Value::String(text) if is_base64_data_uri(text) => text.clear(),
        Value::Array(items) => items.iter_mut().for_each(scrub),
        Value::Object(map) => map.values_mut().for_each(scrub),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(br#"{"name":"A"}"#.as_slice(), json!({"name": "A"}))]
    #[case(br#"[{"name":"A"},{"name":"B"}]"#.as_slice(), json!({"name": "A"}))]
    #[case(br#"[[{"name":"A"}]]"#.as_slice(), json!({"name": "A"}))]
    #[case(br#""{\"name\":\"A\"}""#.as_slice(), json!({"name": "A"}))]
    #[case(br#"[]"#.as_slice(), json!({}))]
    #[case(br#"42"#.as_slice(), json!({}))]
    #[case(br#""plain text""#.as_slice(), json!({}))]
    #[case(b"<html>not json</html>".as_slice(), json!({}))]
    #[case(b"\xff\xfe".as_slice(), json!({}))]
    fn test_parse_document(#[case] body: &[u8], #[case] expected: Value) {
        assert_eq!(parse_document(body), expected);
    }

    #[rstest]
    #[case(json!({"name": "Ape\u{0000} #1"}), Some("Ape #1"))]
    #[case(json!({"name": 1234}), Some("1234"))]
    #[case(json!({"name": null}), None)]
    #[case(json!({"title": "x"}), None)]
    fn test_extract_name(#[case] document: Value, #[case] expected: Option<&str>) {
        assert_eq!(extract_name(&document).as_deref(), expected);
    }

    #[rstest]
    fn test_scrub_replaces_top_level_image_and_blanks_nested() {
        let document = json!({
            "image": "data:image/png;base64,iVBORw0KGgo=",
            "animation_url": "data:text/html;base64,PGgxPg==",
            "attributes": [{"trait_type": "icon", "value": "data:image/svg+xml;base64,PHN2Zz4="}],
            "external_url": "https://example.com",
        });

        let scrubbed = scrub_inline_data(document, Some("https://cdn/1/0xabc/7".to_string()));

        assert_eq!(
            scrubbed,
            json!({
                "image": "https://cdn/1/0xabc/7",
                "animation_url": "",
                "attributes": [{"trait_type": "icon", "value": ""}],
                "external_url": "https://example.com",
            })
        );
    }

    #[rstest]
    fn test_scrub_without_upload_blanks_image() {
        let document = json!({"image": "data:image/png;base64,iVBORw0KGgo="});
        assert_eq!(scrub_inline_data(document, None), json!({"image": ""}));
    }

    #[rstest]
    fn test_inline_image() {
        let document = json!({"image": "data:image/png;base64,aGVsbG8="});
        let image = inline_image(&document).unwrap();
        assert_eq!(image.media_type, "image/png");
        assert_eq!(image.data, b"hello");
        assert!(inline_image(&json!({"image": "https://example.com/a.png"})).is_none());
    }

    #[rstest]
    fn test_image_key_is_lowercase() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(
            image_key(1, &address, &U256::from(7)),
            "1/0xabababababababababababababababababababab/7"
        );
    }
}
