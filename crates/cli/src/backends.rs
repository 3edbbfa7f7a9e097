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

//! Connects the pipeline to Redis and Postgres.

use std::sync::Arc;

use nftsync_common::{
    config::NftSyncConfig,
    logging::{alert_channel, init_tracing, spawn_alert_forwarder},
};
use nftsync_infrastructure::{
    dingtalk::DingTalkAlerter,
    redis::{
        broker::RedisBroker, cache::RedisTokenCache, create_redis_connection,
        lock::RedisLockManager, ratelimiter::RedisRateLimiter,
    },
    sql::{
        pg::{PostgresConnectOptions, connect_pg},
        repository::PostgresRepository,
    },
};
use nftsync_model::messages::{METADATA_SYNC_EXCHANGE, TRANSFER_EXCHANGE};
use nftsync_pipeline::context::{Backends, rate_limit_policy};

/// Installs the tracing subscriber, forwarding error events to DingTalk when configured.
///
/// # Errors
///
/// Returns an error if the alerter or the subscriber cannot be set up.
pub fn init_logging(config: &NftSyncConfig) -> anyhow::Result<()> {
    match DingTalkAlerter::from_config(&config.alerting)? {
        Some(alerter) => {
            let (layer, receiver) = alert_channel();
            init_tracing(Some(layer))?;
            spawn_alert_forwarder(receiver, Arc::new(alerter));
        }
        None => init_tracing(None)?,
    }
    Ok(())
}

/// Connects the Redis and Postgres backends of a deployment.
///
/// # Errors
///
/// Returns an error if either service is unreachable.
pub async fn connect_backends(config: &NftSyncConfig) -> anyhow::Result<(Backends, RedisBroker)> {
    let keys = config.key_space();
    let con = create_redis_connection("nftsync", &config.redis).await?;

    let options = PostgresConnectOptions::from(&config.postgres);
    tracing::info!(
        "Connecting to Postgres at {}:{}/{}",
        options.host,
        options.port,
        options.database
    );
    let pool = connect_pg(options.into(), config.postgres.max_connections).await?;

    if config.metadata.upload_images {
        tracing::warn!("Image upload is enabled without an object store, inline images are dropped");
    }

    let broker = RedisBroker::new(con.clone(), &keys);
    let backends = Backends {
        locks: Arc::new(RedisLockManager::new(con.clone())),
        cache: Arc::new(RedisTokenCache::new(con.clone(), keys)),
        repository: Arc::new(PostgresRepository::new(pool)),
        broker: Arc::new(broker.clone()),
        limiter: Arc::new(RedisRateLimiter::new(
            con,
            rate_limit_policy(config),
            &config.key_prefix,
        )),
        store: None,
    };
    Ok((backends, broker))
}

/// Returns deliveries a crashed predecessor took but never acknowledged to their queues.
///
/// # Errors
///
/// Returns an error if Redis cannot be written.
pub async fn recover_deliveries(
    broker: &RedisBroker,
    config: &NftSyncConfig,
) -> anyhow::Result<()> {
    for chain_id in &config.support_chains {
        let routing_key = chain_id.to_string();
        for exchange in [TRANSFER_EXCHANGE, METADATA_SYNC_EXCHANGE] {
            let recovered = broker.recover(exchange, &routing_key).await?;
            if recovered > 0 {
                tracing::info!(
                    "Recovered {recovered} unacknowledged {exchange} deliveries for chain {chain_id}"
                );
            }
        }
    }
    Ok(())
}
