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

//! Long-running tasks driving the pipeline of one process.
//!
//! Each supported chain gets a transfer sync loop, a reconciliation consumer and a metadata
//! dispatcher. A single replay loop re-publishes persisted publish failures. Every task stops
//! when the runtime's [`CancellationToken`] is cancelled.

use std::{sync::Arc, time::Duration};

use nftsync_model::messages::METADATA_SYNC_EXCHANGE;
use nftsync_network::backoff::ExponentialBackoff;
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    context::PipelineContext,
    metadata::MetadataResolver,
    reconcile::Reconciler,
    sync::{SyncOutcome, TransferSyncEngine},
};

const REPLAY_INTERVAL: Duration = Duration::from_secs(60);
const RECONCILE_SWEEP_BATCH: usize = 500;
const BACKOFF_MAX: Duration = Duration::from_secs(60);
const BACKOFF_FACTOR: f64 = 2.0;
const BACKOFF_JITTER_MS: u64 = 500;

/// Owns the background tasks of the pipeline.
#[derive(Debug)]
pub struct PipelineRuntime {
    ctx: Arc<PipelineContext>,
    cancellation_token: CancellationToken,
    metadata_permits: Arc<Semaphore>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineRuntime {
    /// Creates a new [`PipelineRuntime`] instance.
    #[must_use]
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let workers = ctx.config.metadata.workers.max(1);
        Self {
            metadata_permits: Arc::new(Semaphore::new(workers)),
            cancellation_token: CancellationToken::new(),
            tasks: Vec::new(),
            ctx,
        }
    }

    /// Returns a token which stops every task when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Returns the number of running tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Spawns the sync, reconciliation and metadata tasks of every supported chain, plus the
    /// publish failure replay loop.
    ///
    /// # Errors
    ///
    /// Returns an error if a chain has no RPC pool or the metadata resolver cannot be built.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let resolver = Arc::new(MetadataResolver::new(self.ctx.clone())?);
        let chain_ids: Vec<u64> = self.ctx.registry.iter().map(|c| c.chain_id).collect();

        for chain_id in chain_ids {
            self.spawn_transfer_sync(chain_id)?;
            self.spawn_reconciler(chain_id);
            self.spawn_metadata_dispatcher(chain_id, resolver.clone());
        }
        self.spawn_failure_replay();

        tracing::info!("Started {} pipeline tasks", self.tasks.len());
        Ok(())
    }

    /// Cancels every task and waits for them, and for in-flight metadata resolutions, to finish.
    pub async fn shutdown(mut self) {
        self.cancellation_token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("Pipeline task failed on shutdown: {e}");
            }
        }

        let workers = self.ctx.config.metadata.workers.max(1);
        let permits = u32::try_from(workers).unwrap_or(u32::MAX);
        if self.metadata_permits.acquire_many(permits).await.is_err() {
            tracing::warn!("Metadata permits closed before in-flight resolutions finished");
        }
        tracing::info!("Pipeline stopped");
    }

    fn spawn_transfer_sync(&mut self, chain_id: u64) -> anyhow::Result<()> {
        let mut engine = TransferSyncEngine::new(self.ctx.clone(), chain_id)?;
        let poll_interval = Duration::from_millis(self.ctx.config.sync.poll_interval_ms);
        let mut backoff = ExponentialBackoff::new(
            poll_interval,
            BACKOFF_MAX.max(poll_interval),
            BACKOFF_FACTOR,
            BACKOFF_JITTER_MS,
            false,
        )?;
        let cancellation = self.cancellation_token.clone();

        let task = tokio::spawn(async move {
            tracing::debug!("Transfer sync started for chain {chain_id}");
            loop {
                let delay = match engine.tick().await {
                    Ok(SyncOutcome::Synced { to_block, head, .. }) if to_block < head => {
                        backoff.reset();
                        Duration::ZERO
                    }
                    Ok(_) => {
                        backoff.reset();
                        poll_interval
                    }
                    Err(e) if e.is_transient() => {
                        let delay = backoff.next_duration();
                        tracing::warn!("Transfer sync for chain {chain_id} retrying in {delay:?}: {e}");
                        delay
                    }
                    Err(e) => {
                        tracing::error!("Transfer sync for chain {chain_id} failed: {e}");
                        backoff.next_duration()
                    }
                };

                let sleep = tokio::time::sleep(delay);
                tokio::pin!(sleep);
                tokio::select! {
                    () = cancellation.cancelled() => {
                        tracing::debug!("Transfer sync for chain {chain_id} cancelled");
                        break;
                    }
                    () = &mut sleep => {}
                }
            }
        });

        self.tasks.push(task);
        Ok(())
    }

    fn spawn_reconciler(&mut self, chain_id: u64) {
        let ctx = self.ctx.clone();
        let reconciler = Reconciler::new(
            chain_id,
            ctx.backends.repository.clone(),
            ctx.backends.broker.clone(),
            Duration::from_millis(ctx.config.sync.receive_timeout_ms),
        );
        let poll_interval = Duration::from_millis(ctx.config.sync.poll_interval_ms);
        let cancellation = self.cancellation_token.clone();

        let task = tokio::spawn(async move {
            // Transfers stored before a crash may never have been queued
            loop {
                match reconciler.reconcile_pending(RECONCILE_SWEEP_BATCH).await {
                    Ok(n) if n < RECONCILE_SWEEP_BATCH => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Pending transfer sweep for chain {chain_id} failed: {e}");
                        break;
                    }
                }
                if cancellation.is_cancelled() {
                    return;
                }
            }

            // A delivery is always handled to its ack once received
            while !cancellation.is_cancelled() {
                if let Err(e) = reconciler.process_next().await {
                    tracing::error!("Reconciliation for chain {chain_id} failed: {e}");
                    let sleep = tokio::time::sleep(poll_interval);
                    tokio::pin!(sleep);
                    tokio::select! {
                        () = cancellation.cancelled() => break,
                        () = &mut sleep => {}
                    }
                }
            }
            tracing::debug!("Reconciler for chain {chain_id} cancelled");
        });

        self.tasks.push(task);
    }

    fn spawn_metadata_dispatcher(&mut self, chain_id: u64, resolver: Arc<MetadataResolver>) {
        let broker = self.ctx.backends.broker.clone();
        let receive_timeout = Duration::from_millis(self.ctx.config.sync.receive_timeout_ms);
        let poll_interval = Duration::from_millis(self.ctx.config.sync.poll_interval_ms);
        let permits = self.metadata_permits.clone();
        let cancellation = self.cancellation_token.clone();
        let routing_key = chain_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    () = cancellation.cancelled() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                match broker
                    .receive(METADATA_SYNC_EXCHANGE, &routing_key, receive_timeout)
                    .await
                {
                    Ok(Some(delivery)) => {
                        let resolver = resolver.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = resolver.handle_delivery(delivery).await {
                                tracing::error!("Metadata delivery for chain {chain_id} failed: {e}");
                            }
                        });
                    }
                    Ok(None) => drop(permit),
                    Err(e) => {
                        drop(permit);
                        tracing::error!("Receiving metadata requests for chain {chain_id} failed: {e}");
                        let sleep = tokio::time::sleep(poll_interval);
                        tokio::pin!(sleep);
                        tokio::select! {
                            () = cancellation.cancelled() => break,
                            () = &mut sleep => {}
                        }
                    }
                }
            }
            tracing::debug!("Metadata dispatcher for chain {chain_id} cancelled");
        });

        self.tasks.push(task);
    }

    fn spawn_failure_replay(&mut self) {
        let fanout = self.ctx.fanout();
        let batch = self.ctx.config.fanout.replay_batch;
        let cancellation = self.cancellation_token.clone();

        let task = tokio::spawn(async move {
            loop {
                let sleep = tokio::time::sleep(REPLAY_INTERVAL);
                tokio::pin!(sleep);
                tokio::select! {
                    () = cancellation.cancelled() => {
                        tracing::debug!("Publish failure replay cancelled");
                        break;
                    }
                    () = &mut sleep => {
                        match fanout.replay_failures(batch).await {
                            Ok(report) if report.replayed + report.failed > 0 => {
                                tracing::info!(
                                    "Replayed {} publish failures, {} still failing",
                                    report.replayed,
                                    report.failed,
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Publish failure replay failed: {e}"),
                        }
                    }
                }
            }
        });

        self.tasks.push(task);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use nftsync_common::config::NftSyncConfig;
    use rstest::rstest;

    use super::*;
    use crate::context::Backends;

    fn context() -> Arc<PipelineContext> {
        let mut config = NftSyncConfig::default();
        config.support_chains = vec![1];
        let backends = Backends::in_memory(&config);
        Arc::new(PipelineContext::new(config, backends).unwrap())
    }

    #[rstest]
    #[tokio::test]
    async fn test_start_spawns_tasks_per_chain() {
        let mut runtime = PipelineRuntime::new(context());
        runtime.start().unwrap();

        // sync, reconcile and metadata for chain 1, plus replay
        assert_eq!(runtime.tasks.len(), 4);
        runtime.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_shutdown_stops_tasks() {
        let mut runtime = PipelineRuntime::new(context());
        runtime.start().unwrap();
        let token = runtime.cancellation_token();

        tokio::time::timeout(Duration::from_secs(10), runtime.shutdown())
            .await
            .unwrap();
        assert!(token.is_cancelled());
    }
}
