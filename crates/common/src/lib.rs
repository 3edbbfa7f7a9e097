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

//! Common components shared by the NFT sync pipeline.
//!
//! The `nftsync-common` crate provides the configuration, logging setup and the collaborator
//! interfaces the pipeline is written against. Every interface has an in-memory implementation
//! used by tests and single-process runs:
//!
//! - [`lock::LockManager`]: token-owned, TTL-bounded mutual exclusion.
//! - [`cache::TokenCache`]: token URI cache, contract attributes and sync sources.
//! - [`repository::Repository`]: transfers, tokens, ownership and failure records.
//! - [`broker::MessageBroker`]: direct and delayed exchanges with acknowledged delivery.
//! - [`storage::ObjectStore`]: uploads of inline token images.
//! - [`alert::Alerter`]: operator alerts.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod alert;
pub mod broker;
pub mod cache;
pub mod config;
pub mod keys;
pub mod lock;
pub mod logging;
pub mod repository;
pub mod storage;
