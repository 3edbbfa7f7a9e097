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

use std::path::PathBuf;

use clap::Parser;

/// Main CLI structure for parsing command-line arguments and options.
///
/// This is the entry point for the `nftsync` command-line interface, running the pipeline and
/// its one-off maintenance operations.
#[derive(Debug, Parser)]
#[clap(version, about, author)]
pub struct NftSyncCli {
    /// Path to a TOML configuration file; environment variables override its values.
    #[arg(long, global = true, env = "NFTSYNC_CONFIG")]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available top-level commands for the `nftsync` CLI.
#[derive(Parser, Debug)]
pub enum Commands {
    /// Runs transfer sync, reconciliation and metadata resolution for every supported chain.
    Run,
    /// Syncs transfers of one chain until it reaches the chain head.
    SyncTransfers {
        /// The chain id or name (case-insensitive). Examples: 1, ethereum, bsc, polygon
        #[arg(long)]
        chain: String,
        /// Maximum number of block ranges to sync (optional, defaults to until caught up)
        #[arg(long)]
        max_ranges: Option<u32>,
    },
    /// Resolves the metadata of one reconciled token.
    ResolveMetadata {
        /// The chain id or name (case-insensitive).
        #[arg(long)]
        chain: String,
        /// The token contract address
        #[arg(long)]
        address: String,
        /// The decimal token id
        #[arg(long)]
        token_id: String,
        /// ERC721 or ERC1155 (optional, detected through ERC-165 when omitted)
        #[arg(long)]
        contract_type: Option<String>,
    },
    /// Republishes subscriber notifications the broker refused.
    ReplayFailures {
        /// Maximum number of failures to replay (optional, defaults to the configured batch)
        #[arg(long)]
        limit: Option<usize>,
    },
    Database(DatabaseOpt),
}

/// Database management options and subcommands.
#[derive(Parser, Debug)]
#[command(about = "Postgres database operations", long_about = None)]
pub struct DatabaseOpt {
    #[clap(subcommand)]
    pub command: DatabaseCommand,
}

/// Connection overrides for database operations, defaulting to the loaded configuration.
#[derive(Parser, Debug, Clone)]
pub struct DatabaseConfig {
    /// Hostname or IP address of the database server.
    #[arg(long)]
    pub host: Option<String>,
    /// Port number of the database server.
    #[arg(long)]
    pub port: Option<u16>,
    /// Username for connecting to the database.
    #[arg(long)]
    pub username: Option<String>,
    /// Name of the database.
    #[arg(long)]
    pub database: Option<String>,
    /// Password for connecting to the database.
    #[arg(long)]
    pub password: Option<String>,
    /// Directory path to the schema files.
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

/// Available database management commands.
#[derive(Parser, Debug, Clone)]
#[command(about = "Postgres database operations", long_about = None)]
pub enum DatabaseCommand {
    /// Initializes a new Postgres database with the latest schema.
    Init(DatabaseConfig),
    /// Drops roles, privileges and deletes all data from the database.
    Drop(DatabaseConfig),
}
