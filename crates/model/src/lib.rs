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

//! Domain model for the NFT sync pipeline.
//!
//! The `nftsync-model` crate defines the entities the pipeline moves between chains, storage and
//! downstream subscribers:
//!
//! - The chain registry with its RPC endpoint pools.
//! - On-chain transfers and their positional identity hash.
//! - Tokens, ownership balances and contract attributes.
//! - Queue messages and the public projection published to subscribers.
//!
//! # Feature flags
//!
//! - `stubs`: Enables type stubs for use in testing scenarios.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod chain;
pub mod contract;
pub mod hex;
pub mod messages;
pub mod nft;
pub mod reconcile;
pub mod transfer;
pub mod validation;

#[cfg(any(test, feature = "stubs"))]
pub mod stubs;

pub use crate::{
    chain::{Blockchain, Chain, ChainRegistry, RpcEndpoint, SharedChain},
    contract::{ContractAttributes, ContractType, Subscriber},
    nft::{Nft, OwnerBalance, owner_hash, token_hash},
    reconcile::{BalanceChange, BalanceDelta, MetadataUpdate, ReconcilePlan},
    transfer::{Transfer, TransferStatus, transfer_hash},
};
