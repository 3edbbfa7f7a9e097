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

//! Network machinery for the NFT sync pipeline.
//!
//! The `nftsync-network` crate provides the pieces every outbound call goes through:
//!
//! - [`backoff`]: Exponential backoff and one-shot jittered delays.
//! - [`retry`]: Bounded in-place retries with per-attempt timeouts.
//! - [`selector`]: Smoothed weighted round-robin over RPC endpoint pools.
//! - [`http`]: A cloneable HTTP client with proxy and timeout support.
//! - [`ratelimiter`]: Multi-window admission control for rate-gated providers.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod http;
pub mod ratelimiter;
pub mod retry;
pub mod selector;
