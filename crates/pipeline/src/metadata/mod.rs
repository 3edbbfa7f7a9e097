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

//! Token metadata resolution.
//!
//! A token's URI comes from the URI cache, the contract's configured prefix or the contract
//! itself. The document behind it is decoded locally for data URIs or fetched over HTTP, then
//! reduced to an object document with inline base64 payloads removed:
//!
//! - [`uri`]: URI normalization and data URI decoding.
//! - [`document`]: pure transforms over documents.
//! - [`resolver`]: the locked resolution flow and its failure handling.

pub mod document;
pub mod resolver;
pub mod uri;

pub use resolver::{MetadataResolver, ResolveError, ResolveOutcome, SkipReason};
