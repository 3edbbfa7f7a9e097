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

//! Pipeline commands: the long-running process and its one-off operations.

use std::sync::Arc;

use nftsync_common::config::NftSyncConfig;
use nftsync_model::SharedChain;
use nftsync_pipeline::{PipelineContext, PipelineRuntime};

use crate::{
    backends::{connect_backends, recover_deliveries},
    opt::Commands,
    pipeline::{metadata::run_resolve_metadata, sync::run_sync_transfers},
};

pub mod metadata;
pub mod sync;

/// Runs a pipeline command against the deployment's backends.
///
/// # Errors
///
/// Returns an error if the backends are unreachable or the command fails.
pub async fn run_pipeline_command(command: Commands, config: NftSyncConfig) -> anyhow::Result<()> {
    let (backends, broker) = connect_backends(&config).await?;

    match command {
        Commands::Run => {
            recover_deliveries(&broker, &config).await?;
            let ctx = Arc::new(PipelineContext::new(config, backends)?);
            run_until_signal(ctx).await
        }
        Commands::SyncTransfers { chain, max_ranges } => {
            let ctx = Arc::new(PipelineContext::new(config, backends)?);
            let chain = resolve_chain(&ctx, &chain)?;
            run_sync_transfers(ctx, chain.chain_id, max_ranges).await
        }
        Commands::ResolveMetadata {
            chain,
            address,
            token_id,
            contract_type,
        } => {
            let ctx = Arc::new(PipelineContext::new(config, backends)?);
            let chain = resolve_chain(&ctx, &chain)?;
            run_resolve_metadata(ctx, chain.chain_id, &address, &token_id, contract_type).await
        }
        Commands::ReplayFailures { limit } => {
            let limit = limit.unwrap_or(config.fanout.replay_batch);
            let ctx = PipelineContext::new(config, backends)?;
            let report = ctx.fanout().replay_failures(limit).await?;
            tracing::info!(
                "Replayed {} publish failures, {} still failing",
                report.replayed,
                report.failed
            );
            Ok(())
        }
        Commands::Database(_) => anyhow::bail!("Database commands do not run the pipeline"),
    }
}

async fn run_until_signal(ctx: Arc<PipelineContext>) -> anyhow::Result<()> {
    let mut runtime = PipelineRuntime::new(ctx);
    runtime.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping pipeline");
    runtime.shutdown().await;
    Ok(())
}

fn resolve_chain(ctx: &PipelineContext, id_or_name: &str) -> anyhow::Result<SharedChain> {
    ctx.registry
        .resolve(id_or_name)
        .ok_or_else(|| anyhow::anyhow!("Chain '{id_or_name}' is not supported"))
}
