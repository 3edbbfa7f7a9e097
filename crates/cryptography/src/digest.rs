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

/// Returns the lowercase hexadecimal MD5 digest of `data`.
///
/// MD5 is used purely as a stable content fingerprint (identity hashes and routing keys shared
/// with downstream systems), not as a security primitive.
#[must_use]
pub fn md5_hex(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

/// Returns the MD5 digest of the concatenation of `parts`, with no separator.
#[must_use]
pub fn md5_concat(parts: &[&str]) -> String {
    md5_hex(&parts.concat())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", "d41d8cd98f00b204e9800998ecf8427e")]
    #[case("0xabc42", "f51fe0e7d72d68b60a2968dac315f3b6")]
    fn test_md5_hex(#[case] data: &str, #[case] expected: &str) {
        assert_eq!(md5_hex(data), expected);
    }

    #[rstest]
    fn test_md5_concat_matches_joined_input() {
        assert_eq!(md5_concat(&["0xabc", "42"]), md5_hex("0xabc42"));
    }
}
