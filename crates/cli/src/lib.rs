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

//! Command-line interface for the NFT sync pipeline.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

mod backends;
mod database;
pub mod opt;
mod pipeline;

use nftsync_common::config::NftSyncConfig;

use crate::{
    backends::init_logging,
    database::postgres::run_database_command,
    opt::{Commands, NftSyncCli},
    pipeline::run_pipeline_command,
};

/// Loads the configuration, installs logging and runs the parsed command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub async fn run(opt: NftSyncCli) -> anyhow::Result<()> {
    let config = NftSyncConfig::load(opt.config.as_deref())?;
    init_logging(&config)?;

    match opt.command {
        Commands::Database(database_opt) => {
            run_database_command(database_opt, &config.postgres).await?;
        }
        command => run_pipeline_command(command, config).await?,
    }
    Ok(())
}
