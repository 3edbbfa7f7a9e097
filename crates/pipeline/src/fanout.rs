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

//! Subscriber notification and durable publishing.
//!
//! A refused publish is never lost: the message is persisted as a publish failure and a
//! replay pass republishes pending records in insertion order.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::join_all;
use nftsync_common::{
    broker::MessageBroker, cache::TokenCache, config::FanoutConfig, repository::Repository,
};
use nftsync_model::{
    Nft, Subscriber,
    messages::{
        ACTION_UPDATE, DELAY_EXCHANGE, DelayedPublish, NftProjection, PublishFailure,
        SYNC_NFT_EXCHANGE,
    },
};

/// Publishes `payload`, persisting it as a publish failure when the broker refuses it.
///
/// Returns `true` when the broker accepted the message.
///
/// # Errors
///
/// Returns an error only if the broker refused the message and the failure could not be
/// persisted either.
pub async fn publish_durable(
    broker: &dyn MessageBroker,
    repository: &dyn Repository,
    exchange: &str,
    routing_key: &str,
    payload: &serde_json::Value,
) -> anyhow::Result<bool> {
    match broker.publish(exchange, routing_key, payload).await {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::warn!(exchange, routing_key, "Publish refused, persisting: {e}");
            let failure = PublishFailure::new(exchange, routing_key, payload.clone(), e.to_string());
            repository.record_publish_failure(&failure).await?;
            Ok(false)
        }
    }
}

/// Publishes `payload` through the delayed exchange, persisting it as a publish failure on
/// [`DELAY_EXCHANGE`] when the broker refuses it.
///
/// Returns `true` when the broker accepted the message.
///
/// # Errors
///
/// Returns an error only if the broker refused the message and the failure could not be
/// persisted either.
pub async fn publish_delayed_durable(
    broker: &dyn MessageBroker,
    repository: &dyn Repository,
    exchange: &str,
    routing_key: &str,
    payload: &serde_json::Value,
    delay: Duration,
) -> anyhow::Result<bool> {
    match broker
        .publish_delayed(exchange, routing_key, payload, delay)
        .await
    {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::warn!(exchange, routing_key, "Delayed publish refused, persisting: {e}");
            let delayed = DelayedPublish {
                exchange: exchange.to_string(),
                delay_ms: u64::try_from(delay.as_millis())?,
                payload: payload.clone(),
            };
            let failure = PublishFailure::new(
                DELAY_EXCHANGE,
                routing_key,
                serde_json::to_value(&delayed)?,
                e.to_string(),
            );
            repository.record_publish_failure(&failure).await?;
            Ok(false)
        }
    }
}

async fn republish(broker: &dyn MessageBroker, failure: &PublishFailure) -> anyhow::Result<()> {
    if failure.exchange == DELAY_EXCHANGE {
        let delayed: DelayedPublish = serde_json::from_value(failure.payload.clone())?;
        broker
            .publish_delayed(
                &delayed.exchange,
                &failure.routing_key,
                &delayed.payload,
                Duration::from_millis(delayed.delay_ms),
            )
            .await
    } else {
        broker
            .publish(&failure.exchange, &failure.routing_key, &failure.payload)
            .await
    }
}

/// Counts of one fanout pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub published: usize,
    /// Publishes refused by the broker and persisted for replay.
    pub persisted: usize,
    /// Sources without a configured secret.
    pub skipped: usize,
}

/// Counts of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
}

/// Publishes token projections to every subscriber registered for the token's contract.
#[derive(Debug)]
pub struct NotificationFanout {
    broker: Arc<dyn MessageBroker>,
    repository: Arc<dyn Repository>,
    cache: Arc<dyn TokenCache>,
    subscribers: HashMap<String, Subscriber>,
    chunk_size: usize,
}

impl NotificationFanout {
    /// Creates a new [`NotificationFanout`] instance.
    #[must_use]
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        repository: Arc<dyn Repository>,
        cache: Arc<dyn TokenCache>,
        config: &FanoutConfig,
    ) -> Self {
        let subscribers = config
            .subscribers
            .iter()
            .map(|s| (s.source.clone(), s.clone()))
            .collect();
        Self {
            broker,
            repository,
            cache,
            subscribers,
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Notifies every subscriber of `nft`'s contract with its public projection.
    ///
    /// One subscriber's failure never blocks the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber set cannot be read or the projection cannot be
    /// serialized.
    pub async fn notify(&self, nft: &Nft) -> anyhow::Result<FanoutReport> {
        let sources = self
            .cache
            .sync_sources(nft.chain_id, &nft.token_address)
            .await?;
        let mut report = FanoutReport::default();
        if sources.is_empty() {
            return Ok(report);
        }

        let payload = serde_json::to_value(NftProjection::from(nft))?;
        let mut routes = Vec::with_capacity(sources.len());
        for source in &sources {
            match self.subscribers.get(source) {
                Some(subscriber) => {
                    routes.push(subscriber.routing_key(ACTION_UPDATE, nft.chain_id));
                }
                None => {
                    tracing::warn!(
                        source = %source,
                        "No secret configured for sync source, skipping"
                    );
                    report.skipped += 1;
                }
            }
        }

        for chunk in routes.chunks(self.chunk_size) {
            let results = join_all(chunk.iter().map(|routing_key| {
                publish_durable(
                    self.broker.as_ref(),
                    self.repository.as_ref(),
                    SYNC_NFT_EXCHANGE,
                    routing_key,
                    &payload,
                )
            }))
            .await;

            for result in results {
                match result {
                    Ok(true) => report.published += 1,
                    Ok(false) => report.persisted += 1,
                    Err(e) => {
                        tracing::error!(
                            chain_id = nft.chain_id,
                            token_hash = %nft.token_hash,
                            "Failed to persist refused notification: {e}"
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    /// Republishes up to `limit` pending publish failures and marks the accepted ones replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending records cannot be read.
    pub async fn replay_failures(&self, limit: usize) -> anyhow::Result<ReplayReport> {
        let pending = self.repository.pending_publish_failures(limit).await?;
        let mut report = ReplayReport::default();

        for failure in pending {
            let Some(id) = failure.id else {
                continue;
            };
            match republish(self.broker.as_ref(), &failure).await {
                Ok(()) => {
                    self.repository.mark_publish_failure_replayed(id).await?;
                    report.replayed += 1;
                }
                Err(e) => {
                    tracing::warn!(id, exchange = %failure.exchange, "Replay refused: {e}");
                    report.failed += 1;
                }
            }
        }

        if report.replayed > 0 || report.failed > 0 {
            tracing::info!(
                "Replayed {} publish failures, {} still pending",
                report.replayed,
                report.failed
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use nftsync_common::{
        broker::InMemoryBroker, cache::InMemoryTokenCache, repository::InMemoryRepository,
    };
    use nftsync_model::{
        messages::TRANSFER_EXCHANGE,
        stubs::{STUB_TOKEN_ADDRESS, stub_nft},
    };
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    struct Harness {
        broker: Arc<InMemoryBroker>,
        repository: Arc<InMemoryRepository>,
        cache: Arc<InMemoryTokenCache>,
        fanout: NotificationFanout,
    }

    fn harness(subscribers: Vec<Subscriber>) -> Harness {
        let broker = Arc::new(InMemoryBroker::new());
        let repository = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(InMemoryTokenCache::new());
        let fanout = NotificationFanout::new(
            broker.clone(),
            repository.clone(),
            cache.clone(),
            &FanoutConfig {
                subscribers,
                chunk_size: 2,
                replay_batch: 10,
            },
        );
        Harness {
            broker,
            repository,
            cache,
            fanout,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_notify_routes_by_signed_key(stub_nft: Nft) {
        let alice = Subscriber::new("alice", "s1");
        let h = harness(vec![alice.clone(), Subscriber::new("bob", "s2")]);
        h.cache.add_sync_source(1, &STUB_TOKEN_ADDRESS, "alice").await.unwrap();
        h.cache.add_sync_source(1, &STUB_TOKEN_ADDRESS, "carol").await.unwrap();

        let report = h.fanout.notify(&stub_nft).await.unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(report.skipped, 1);
        let routing_key = alice.routing_key(ACTION_UPDATE, 1);
        let delivered = h.broker.peek(SYNC_NFT_EXCHANGE, &routing_key);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["tokenHash"], stub_nft.token_hash);
        assert_eq!(delivered[0]["chainId"], 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_notify_without_sources_is_noop(stub_nft: Nft) {
        let h = harness(vec![Subscriber::new("alice", "s1")]);
        let report = h.fanout.notify(&stub_nft).await.unwrap();
        assert_eq!(report, FanoutReport::default());
    }

    #[rstest]
    #[tokio::test]
    async fn test_refused_notification_is_persisted_then_replayed(stub_nft: Nft) {
        let alice = Subscriber::new("alice", "s1");
        let h = harness(vec![alice.clone()]);
        h.cache.add_sync_source(1, &STUB_TOKEN_ADDRESS, "alice").await.unwrap();
        h.broker.refuse(SYNC_NFT_EXCHANGE);

        let report = h.fanout.notify(&stub_nft).await.unwrap();
        assert_eq!(report.persisted, 1);
        assert_eq!(h.repository.publish_failures().len(), 1);

        let report = h.fanout.replay_failures(10).await.unwrap();
        assert_eq!(report, ReplayReport { replayed: 0, failed: 1 });

        h.broker.accept(SYNC_NFT_EXCHANGE);
        let report = h.fanout.replay_failures(10).await.unwrap();
        assert_eq!(report, ReplayReport { replayed: 1, failed: 0 });
        assert_eq!(
            h.broker
                .peek(SYNC_NFT_EXCHANGE, &alice.routing_key(ACTION_UPDATE, 1))
                .len(),
            1
        );
        assert_eq!(h.fanout.replay_failures(10).await.unwrap().replayed, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_refused_delayed_publish_is_replayed_with_its_delay() {
        let h = harness(vec![]);
        let payload = json!({ "chain_id": 1, "transfer_hash": "0xabc", "times": 1 });
        h.broker.refuse(DELAY_EXCHANGE);

        let accepted = publish_delayed_durable(
            h.broker.as_ref(),
            h.repository.as_ref(),
            TRANSFER_EXCHANGE,
            "1",
            &payload,
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert!(!accepted);
        let failures = h.repository.publish_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].exchange, DELAY_EXCHANGE);

        h.broker.accept(DELAY_EXCHANGE);
        let report = h.fanout.replay_failures(10).await.unwrap();
        assert_eq!(report, ReplayReport { replayed: 1, failed: 0 });
        assert_eq!(h.broker.delayed_len(), 1);
        assert!(h.broker.delayed_remaining()[0] <= Duration::from_secs(2));
        assert!(h.broker.peek(TRANSFER_EXCHANGE, "1").is_empty());

        h.broker.release_delayed();
        assert_eq!(h.broker.peek(TRANSFER_EXCHANGE, "1"), vec![payload]);
    }
}
