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

//! Backing services for the NFT sync pipeline.
//!
//! The `nftsync-infrastructure` crate implements the storage, coordination and alerting seams
//! declared in `nftsync-common` against real services:
//!
//! - Redis: the message broker with delayed delivery, distributed locks, the token URI and
//!   contract attribute cache, and the shared rate limiter.
//! - Postgres: the transfer, token and ownership repository plus schema management.
//! - DingTalk: operator alerts through a signed robot webhook.
//!
//! # Feature flags
//!
//! - `redis`: Enables the Redis backends.
//! - `postgres`: Enables the Postgres repository.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod dingtalk;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "postgres")]
pub mod sql;
