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

//! A [`MessageBroker`] over Redis lists.
//!
//! Each queue is a list; a delivery is moved atomically into a per-queue processing list and
//! removed on acknowledgement, so a crashed consumer leaves its delivery recoverable. Delayed
//! publishes wait in a sorted set scored by due time and are promoted into their queues by a
//! script before every receive.

use std::time::Duration;

use async_trait::async_trait;
use nftsync_common::{
    broker::{Delivery, MessageBroker, queue_name},
    keys::KeySpace,
};
use nftsync_core::datetime::unix_millis_now;
use nftsync_model::messages::DELAY_EXCHANGE;
use redis::{Script, aio::ConnectionManager};
use serde::{Deserialize, Serialize};

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROMOTE_BATCH: u32 = 100;

// KEYS[1]: delayed set. ARGV: now_ms, queue key prefix, batch size.
const PROMOTE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[3]))
for _, member in ipairs(due) do
    local envelope = cjson.decode(member)
    redis.call('RPUSH', ARGV[2] .. envelope.exchange .. ':' .. envelope.routing_key, envelope.payload)
    redis.call('ZREM', KEYS[1], member)
end
return #due
";

#[derive(Debug, Serialize, Deserialize)]
struct DelayedEnvelope {
    id: String,
    exchange: String,
    routing_key: String,
    payload: String,
}

/// A [`MessageBroker`] whose queues live in Redis.
#[derive(Clone)]
pub struct RedisBroker {
    con: ConnectionManager,
    queue_prefix: String,
    delayed_key: String,
    promote: Script,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RedisBroker))
            .field("queue_prefix", &self.queue_prefix)
            .field("delayed_key", &self.delayed_key)
            .finish()
    }
}

impl RedisBroker {
    /// Creates a new [`RedisBroker`] with queues under the deployment key prefix.
    #[must_use]
    pub fn new(con: ConnectionManager, keys: &KeySpace) -> Self {
        let queue_prefix = format!("{}queue:", keys.prefix());
        Self {
            con,
            delayed_key: format!("{queue_prefix}{DELAY_EXCHANGE}"),
            queue_prefix,
            promote: Script::new(PROMOTE_SCRIPT),
        }
    }

    fn queue_key(&self, exchange: &str, routing_key: &str) -> String {
        format!("{}{}", self.queue_prefix, queue_name(exchange, routing_key))
    }

    fn processing_key(&self, exchange: &str, routing_key: &str) -> String {
        format!("{}:processing", self.queue_key(exchange, routing_key))
    }

    async fn promote_due(&self, con: &mut ConnectionManager) -> anyhow::Result<()> {
        let promoted: i64 = self
            .promote
            .key(&self.delayed_key)
            .arg(unix_millis_now())
            .arg(&self.queue_prefix)
            .arg(PROMOTE_BATCH)
            .invoke_async(con)
            .await?;
        if promoted > 0 {
            tracing::debug!("Promoted {promoted} delayed messages");
        }
        Ok(())
    }

    /// Returns unacknowledged deliveries of a queue to its head, oldest first.
    ///
    /// Called by a consumer before it starts, to recover deliveries a crashed predecessor
    /// took but never acknowledged.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis cannot be written.
    pub async fn recover(&self, exchange: &str, routing_key: &str) -> anyhow::Result<usize> {
        let processing = self.processing_key(exchange, routing_key);
        let queue = self.queue_key(exchange, routing_key);
        let mut con = self.con.clone();
        let mut recovered = 0;
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(&queue)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut con)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!("Recovered {recovered} unacknowledged messages on {queue}");
        }
        Ok(recovered)
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut con = self.con.clone();
        redis::cmd("RPUSH")
            .arg(self.queue_key(exchange, routing_key))
            .arg(payload.to_string())
            .exec_async(&mut con)
            .await?;
        Ok(())
    }

    async fn publish_delayed(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> anyhow::Result<()> {
        let envelope = DelayedEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_string(),
        };
        let due = unix_millis_now() + u64::try_from(delay.as_millis())?;
        let mut con = self.con.clone();
        redis::cmd("ZADD")
            .arg(&self.delayed_key)
            .arg(due)
            .arg(serde_json::to_string(&envelope)?)
            .exec_async(&mut con)
            .await?;
        Ok(())
    }

    async fn receive(
        &self,
        exchange: &str,
        routing_key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<Delivery>> {
        let queue = self.queue_key(exchange, routing_key);
        let processing = self.processing_key(exchange, routing_key);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut con = self.con.clone();

        loop {
            self.promote_due(&mut con).await?;
            let raw: Option<String> = redis::cmd("LMOVE")
                .arg(&queue)
                .arg(&processing)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut con)
                .await?;

            if let Some(raw) = raw {
                let payload = match serde_json::from_str(&raw) {
                    Ok(payload) => payload,
                    Err(e) => {
                        // Unparseable entries would block the queue forever
                        tracing::error!("Discarding malformed message on {queue}: {e}");
                        redis::cmd("LREM")
                            .arg(&processing)
                            .arg(1)
                            .arg(&raw)
                            .exec_async(&mut con)
                            .await?;
                        continue;
                    }
                };
                return Ok(Some(Delivery {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    payload,
                    tag: raw,
                }));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIVE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let mut con = self.con.clone();
        redis::cmd("LREM")
            .arg(self.processing_key(&delivery.exchange, &delivery.routing_key))
            .arg(1)
            .arg(&delivery.tag)
            .exec_async(&mut con)
            .await?;
        Ok(())
    }
}
