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

//! Delayed requeue of failed queue items with a bounded attempt budget.

use std::{fmt::Debug, sync::Arc, time::Duration};

use nftsync_common::{broker::MessageBroker, config::SchedulerConfig, repository::Repository};
use nftsync_model::messages::{DELAY_EXCHANGE, RetryableMessage};
use nftsync_network::backoff::jittered_delay;
use serde::Serialize;

use crate::fanout::publish_delayed_durable;

/// The fate of an item handed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Requeued through the delayed exchange as attempt `attempt`.
    Requeued { attempt: u32, delay: Duration },
    /// The delayed exchange refused the item; it is persisted as a publish failure and replayed.
    Persisted { attempt: u32, delay: Duration },
    /// The attempt budget is spent; the item was dropped.
    Dropped { attempts: u32 },
}

/// Requeues failed items through the delayed exchange.
///
/// The attempt counter travels on the item itself, so the budget holds across processes.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    broker: Arc<dyn MessageBroker>,
    repository: Arc<dyn Repository>,
    base_delay: Duration,
    max_attempts: u32,
}

impl RetryScheduler {
    /// Creates a new [`RetryScheduler`] instance.
    #[must_use]
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        repository: Arc<dyn Repository>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            broker,
            repository,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` if a failure of `item` would spend the last attempt of its budget.
    #[must_use]
    pub fn is_final_attempt<M: RetryableMessage>(&self, item: &M) -> bool {
        item.times() + 1 >= self.max_attempts
    }

    /// Schedules another attempt of `item` after a jittered delay, or drops it once
    /// `max_attempts` attempts have failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be serialized, or the broker refuses it and the
    /// publish failure cannot be persisted.
    pub async fn schedule<M>(
        &self,
        exchange: &str,
        routing_key: &str,
        item: M,
        reason: &str,
    ) -> anyhow::Result<ScheduleOutcome>
    where
        M: RetryableMessage + Serialize + Debug + Send + Sync,
    {
        let item = item.next_attempt();
        let attempt = item.times();
        if attempt >= self.max_attempts {
            tracing::error!(
                exchange,
                routing_key,
                attempts = attempt,
                "Dropping {item:?} after {attempt} failed attempts: {reason}"
            );
            return Ok(ScheduleOutcome::Dropped { attempts: attempt });
        }

        let delay = jittered_delay(self.base_delay);
        let accepted = self.requeue(exchange, routing_key, &item, delay).await?;
        tracing::debug!(
            "Requeued {item:?} through {DELAY_EXCHANGE} as attempt {attempt} in {delay:?}"
        );
        Ok(if accepted {
            ScheduleOutcome::Requeued { attempt, delay }
        } else {
            ScheduleOutcome::Persisted { attempt, delay }
        })
    }

    /// Requeues `item` after a jittered delay without spending an attempt.
    ///
    /// Used when the item could not be tried at all, e.g. its provider's rate limit was
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be serialized, or the broker refuses it and the
    /// publish failure cannot be persisted.
    pub async fn defer<M>(
        &self,
        exchange: &str,
        routing_key: &str,
        item: &M,
    ) -> anyhow::Result<ScheduleOutcome>
    where
        M: RetryableMessage + Serialize + Debug + Sync,
    {
        let delay = jittered_delay(self.base_delay);
        let attempt = item.times();
        let accepted = self.requeue(exchange, routing_key, item, delay).await?;
        tracing::debug!("Deferred {item:?} through {DELAY_EXCHANGE} for {delay:?}");
        Ok(if accepted {
            ScheduleOutcome::Requeued { attempt, delay }
        } else {
            ScheduleOutcome::Persisted { attempt, delay }
        })
    }

    async fn requeue<M: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        item: &M,
        delay: Duration,
    ) -> anyhow::Result<bool> {
        let payload = serde_json::to_value(item)?;
        publish_delayed_durable(
            self.broker.as_ref(),
            self.repository.as_ref(),
            exchange,
            routing_key,
            &payload,
            delay,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use nftsync_common::{broker::InMemoryBroker, repository::InMemoryRepository};
    use nftsync_model::messages::{DelayedPublish, TRANSFER_EXCHANGE, TransferMessage};
    use rstest::rstest;

    use super::*;

    fn scheduler(broker: Arc<InMemoryBroker>, repository: Arc<InMemoryRepository>) -> RetryScheduler {
        RetryScheduler::new(
            broker,
            repository,
            &SchedulerConfig {
                base_delay_ms: 1_000,
                max_attempts: 3,
            },
        )
    }

    #[rstest]
    #[tokio::test]
    async fn test_requeue_delay_is_jittered_within_bounds() {
        let broker = Arc::new(InMemoryBroker::new());
        let scheduler = scheduler(broker.clone(), Arc::new(InMemoryRepository::new()));

        let outcome = scheduler
            .schedule(TRANSFER_EXCHANGE, "1", TransferMessage::new(1, "h"), "boom")
            .await
            .unwrap();

        let ScheduleOutcome::Requeued { attempt, delay } = outcome else {
            panic!("expected requeue, was {outcome:?}");
        };
        assert_eq!(attempt, 1);
        assert!(delay >= Duration::from_millis(1_000));
        assert!(delay <= Duration::from_millis(2_000));
        assert_eq!(broker.delayed_len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_third_failure_drops() {
        let broker = Arc::new(InMemoryBroker::new());
        let scheduler = scheduler(broker.clone(), Arc::new(InMemoryRepository::new()));
        let mut message = TransferMessage::new(1, "h");
        message.times = 2;
        assert!(scheduler.is_final_attempt(&message));

        let outcome = scheduler
            .schedule(TRANSFER_EXCHANGE, "1", message, "boom")
            .await
            .unwrap();

        assert_eq!(outcome, ScheduleOutcome::Dropped { attempts: 3 });
        assert_eq!(broker.delayed_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_defer_keeps_attempt_counter() {
        let broker = Arc::new(InMemoryBroker::new());
        let scheduler = scheduler(broker.clone(), Arc::new(InMemoryRepository::new()));
        let mut message = TransferMessage::new(1, "h");
        message.times = 2;

        let outcome = scheduler
            .defer(TRANSFER_EXCHANGE, "1", &message)
            .await
            .unwrap();

        assert!(matches!(outcome, ScheduleOutcome::Requeued { attempt: 2, .. }));
        broker.release_delayed();
        let queued = broker.peek(TRANSFER_EXCHANGE, "1");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0]["times"], 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_refused_requeue_is_persisted() {
        let broker = Arc::new(InMemoryBroker::new());
        let repository = Arc::new(InMemoryRepository::new());
        let scheduler = scheduler(broker.clone(), repository.clone());
        broker.refuse(DELAY_EXCHANGE);

        let outcome = scheduler
            .schedule(TRANSFER_EXCHANGE, "1", TransferMessage::new(1, "h"), "boom")
            .await
            .unwrap();

        assert!(matches!(outcome, ScheduleOutcome::Persisted { attempt: 1, .. }));
        let failures = repository.publish_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].exchange, DELAY_EXCHANGE);
        assert_eq!(failures[0].routing_key, "1");
        let delayed: DelayedPublish = serde_json::from_value(failures[0].payload.clone()).unwrap();
        assert_eq!(delayed.exchange, TRANSFER_EXCHANGE);
        assert_eq!(delayed.payload["times"], 1);
        assert!(delayed.delay_ms >= 1_000);
    }
}
