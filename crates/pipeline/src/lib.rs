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

//! Transfer synchronization, ownership reconciliation and metadata resolution.
//!
//! The `nftsync-pipeline` crate contains the three stages of the pipeline and the tasks that
//! drive them:
//!
//! - [`sync`]: scans block ranges of each chain for NFT transfer logs and queues them.
//! - [`reconcile`]: applies queued transfers to token and ownership state.
//! - [`metadata`]: resolves token URIs and metadata documents, with retry and quarantine.
//! - [`fanout`]: notifies the subscribers of a contract after a token changes.
//! - [`workers`]: the long-running per-chain tasks of a process.
//!
//! Chain access goes through the [`rpc::BlockchainRpcClient`] seam and every backend through
//! the traits of `nftsync-common`, so each stage runs against in-memory backends in tests.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod context;
pub mod contracts;
pub mod events;
pub mod fanout;
pub mod metadata;
pub mod provider;
pub mod reconcile;
pub mod reporting;
pub mod rpc;
pub mod scheduler;
pub mod sync;
pub mod workers;

pub use crate::{
    context::{Backends, PipelineContext},
    workers::PipelineRuntime,
};
