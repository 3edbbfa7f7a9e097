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

//! Message broker seam: direct exchanges, a delayed exchange and acknowledged delivery.
//!
//! A queue is addressed by `exchange:routing_key`. Consumers take one delivery at a time and
//! acknowledge it before receiving the next, so a queue with a single consumer is processed in
//! publish order.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use nftsync_model::messages::DELAY_EXCHANGE;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Returns the queue name bound to `exchange` with `routing_key`.
#[must_use]
pub fn queue_name(exchange: &str, routing_key: &str) -> String {
    format!("{exchange}:{routing_key}")
}

/// A message taken from a queue and not yet acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    /// Broker-specific handle identifying the in-flight message.
    pub tag: String,
}

impl Delivery {
    /// Decodes the payload into a typed message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            anyhow::anyhow!(
                "Malformed message on {}: {e}",
                queue_name(&self.exchange, &self.routing_key)
            )
        })
    }
}

#[async_trait]
pub trait MessageBroker: Debug + Send + Sync {
    /// Publishes `payload` to the queue bound to `exchange` with `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker refuses the message.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Publishes `payload` through the delayed exchange; it reaches its queue after `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker refuses the message.
    async fn publish_delayed(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> anyhow::Result<()>;

    /// Takes the next message of a queue, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be read.
    async fn receive(
        &self,
        exchange: &str,
        routing_key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<Delivery>>;

    /// Acknowledges a delivery, removing it from the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be written.
    async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()>;
}

/// Serializes and publishes a typed message.
///
/// # Errors
///
/// Returns an error if serialization fails or the broker refuses the message.
pub async fn publish_message<T: Serialize + Sync>(
    broker: &dyn MessageBroker,
    exchange: &str,
    routing_key: &str,
    message: &T,
) -> anyhow::Result<()> {
    let payload = serde_json::to_value(message)?;
    broker.publish(exchange, routing_key, &payload).await
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<serde_json::Value>>,
    delayed: Vec<(Instant, String, String, serde_json::Value)>,
    unacked: HashMap<String, String>,
    refused: HashSet<String>,
    next_tag: u64,
}

impl BrokerState {
    fn promote_due(&mut self, now: Instant) {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, ..)| *at <= now);
        self.delayed = pending;
        for (_, exchange, routing_key, payload) in due {
            self.queues
                .entry(queue_name(&exchange, &routing_key))
                .or_default()
                .push_back(payload);
        }
    }
}

/// A process-local [`MessageBroker`].
///
/// Exchanges can be marked as refusing publishes to exercise publish-failure handling.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new [`InMemoryBroker`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every publish to `exchange` fail until [`Self::accept`] is called.
    pub fn refuse(&self, exchange: &str) {
        self.state().refused.insert(exchange.to_string());
    }

    /// Lets `exchange` accept publishes again.
    pub fn accept(&self, exchange: &str) {
        self.state().refused.remove(exchange);
    }

    /// Returns the ready messages of a queue without consuming them.
    #[must_use]
    pub fn peek(&self, exchange: &str, routing_key: &str) -> Vec<serde_json::Value> {
        self.state()
            .queues
            .get(&queue_name(exchange, routing_key))
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of messages waiting in the delayed exchange.
    #[must_use]
    pub fn delayed_len(&self) -> usize {
        self.state().delayed.len()
    }

    /// Returns the delays remaining on messages in the delayed exchange.
    #[must_use]
    pub fn delayed_remaining(&self) -> Vec<Duration> {
        let now = Instant::now();
        self.state()
            .delayed
            .iter()
            .map(|(at, ..)| at.saturating_duration_since(now))
            .collect()
    }

    /// Moves every delayed message to its queue regardless of its delay.
    pub fn release_delayed(&self) {
        let mut state = self.state();
        let far = Instant::now() + Duration::from_secs(365 * 24 * 3600);
        state.promote_due(far);
    }

    /// Returns the number of delivered but unacknowledged messages.
    #[must_use]
    pub fn unacked_len(&self) -> usize {
        self.state().unacked.len()
    }

    fn check_accepts(state: &BrokerState, exchange: &str) -> anyhow::Result<()> {
        if state.refused.contains(exchange) {
            anyhow::bail!("Exchange {exchange} refused the message");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut state = self.state();
        Self::check_accepts(&state, exchange)?;
        state
            .queues
            .entry(queue_name(exchange, routing_key))
            .or_default()
            .push_back(payload.clone());
        Ok(())
    }

    async fn publish_delayed(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> anyhow::Result<()> {
        let mut state = self.state();
        Self::check_accepts(&state, DELAY_EXCHANGE)?;
        Self::check_accepts(&state, exchange)?;
        state.delayed.push((
            Instant::now() + delay,
            exchange.to_string(),
            routing_key.to_string(),
            payload.clone(),
        ));
        Ok(())
    }

    async fn receive(
        &self,
        exchange: &str,
        routing_key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<Delivery>> {
        let queue = queue_name(exchange, routing_key);
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state();
                state.promote_due(Instant::now());
                let next = state.queues.get_mut(&queue).and_then(VecDeque::pop_front);
                if let Some(payload) = next {
                    state.next_tag += 1;
                    let tag = state.next_tag.to_string();
                    state.unacked.insert(tag.clone(), queue);
                    return Ok(Some(Delivery {
                        exchange: exchange.to_string(),
                        routing_key: routing_key.to_string(),
                        payload,
                        tag,
                    }));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIVE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()> {
        self.state().unacked.remove(&delivery.tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn test_queue_is_fifo() {
        let broker = InMemoryBroker::new();
        for n in 0..3 {
            broker.publish("ex", "1", &json!(n)).await.unwrap();
        }
        for n in 0..3 {
            let delivery = broker
                .receive("ex", "1", Duration::ZERO)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.payload, json!(n));
            broker.ack(&delivery).await.unwrap();
        }
        assert!(
            broker
                .receive("ex", "1", Duration::from_millis(20))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_routing_keys_are_separate_queues() {
        let broker = InMemoryBroker::new();
        broker.publish("ex", "1", &json!("a")).await.unwrap();
        assert!(
            broker
                .receive("ex", "56", Duration::ZERO)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(broker.peek("ex", "1"), vec![json!("a")]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_delayed_message_arrives_after_delay() {
        let broker = InMemoryBroker::new();
        broker
            .publish_delayed("ex", "1", &json!("late"), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(broker.delayed_len(), 1);
        assert!(
            broker
                .receive("ex", "1", Duration::ZERO)
                .await
                .unwrap()
                .is_none()
        );

        let delivery = broker
            .receive("ex", "1", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, json!("late"));
        assert_eq!(broker.delayed_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_unacked_until_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("ex", "1", &json!(1)).await.unwrap();
        let delivery = broker
            .receive("ex", "1", Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(broker.unacked_len(), 1);
        broker.ack(&delivery).await.unwrap();
        assert_eq!(broker.unacked_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_refused_exchange() {
        let broker = InMemoryBroker::new();
        broker.refuse("ex");
        assert!(broker.publish("ex", "1", &json!(1)).await.is_err());
        broker.accept("ex");
        assert!(broker.publish("ex", "1", &json!(1)).await.is_ok());
    }

    #[rstest]
    fn test_decode_reports_queue() {
        let delivery = Delivery {
            exchange: "ex".to_string(),
            routing_key: "1".to_string(),
            payload: json!({"unexpected": true}),
            tag: "t".to_string(),
        };
        let err = delivery.decode::<Vec<u8>>().unwrap_err();
        assert!(err.to_string().contains("ex:1"));
    }
}
