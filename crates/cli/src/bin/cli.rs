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

use clap::Parser;
use nftsync_cli::opt::NftSyncCli;
use nftsync_common::logging::logging_is_initialized;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(e) = nftsync_cli::run(NftSyncCli::parse()).await {
        if logging_is_initialized() {
            tracing::error!("Error executing nftsync CLI: {e}");
        } else {
            eprintln!("Error executing nftsync CLI: {e}");
        }
        std::process::exit(1);
    }
}
