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

//! Broker, lock and rate limiter tests against a live Redis.

#[cfg(target_os = "linux")] // Databases only supported on Linux
mod serial_tests {
    use std::time::Duration;

    use nftsync_common::{
        broker::MessageBroker,
        config::DatabaseConfig,
        keys::KeySpace,
        lock::LockManager,
    };
    use nftsync_infrastructure::redis::{
        broker::RedisBroker, create_redis_connection, flush_redis, lock::RedisLockManager,
        ratelimiter::RedisRateLimiter,
    };
    use nftsync_network::ratelimiter::{RateLimitPolicy, RateLimiter, RateWindow};
    use redis::aio::ConnectionManager;

    async fn get_connection() -> ConnectionManager {
        let mut con = create_redis_connection("test", &DatabaseConfig::default())
            .await
            .unwrap();
        flush_redis(&mut con).await.unwrap();
        con
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Redis"]
    async fn test_broker_delivers_in_order_and_acks() {
        let broker = RedisBroker::new(get_connection().await, &KeySpace::new("test:"));
        for n in 0..3 {
            broker
                .publish("transfer_exchange", "1", &serde_json::json!({ "n": n }))
                .await
                .unwrap();
        }

        for n in 0..3 {
            let delivery = broker
                .receive("transfer_exchange", "1", Duration::from_secs(1))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.payload["n"], n);
            broker.ack(&delivery).await.unwrap();
        }
        assert_eq!(broker.recover("transfer_exchange", "1").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Redis"]
    async fn test_broker_delayed_publish() {
        let broker = RedisBroker::new(get_connection().await, &KeySpace::new("test:"));
        broker
            .publish_delayed(
                "metadata_sync_exchange",
                "1",
                &serde_json::json!({ "x": 1 }),
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        assert!(
            broker
                .receive("metadata_sync_exchange", "1", Duration::from_millis(50))
                .await
                .unwrap()
                .is_none()
        );
        let delivery = broker
            .receive("metadata_sync_exchange", "1", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(delivery.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Redis"]
    async fn test_lock_is_exclusive() {
        let locks = RedisLockManager::new(get_connection().await);
        let ttl = Duration::from_secs(5);

        let token = locks.acquire("test:lock", ttl).await.unwrap().unwrap();
        assert!(locks.acquire("test:lock", ttl).await.unwrap().is_none());
        assert!(locks.release("test:lock", &token).await.unwrap());
        assert!(locks.acquire("test:lock", ttl).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a running Redis"]
    async fn test_rate_limiter_rejects_over_budget() {
        let policy = RateLimitPolicy::new(
            "moralis",
            vec![RateWindow::new("second", Duration::from_secs(1), 10)],
        )
        .unwrap();
        let limiter = RedisRateLimiter::new(get_connection().await, policy, "test:");

        assert!(limiter.try_acquire(5).await.unwrap());
        assert!(limiter.try_acquire(5).await.unwrap());
        assert!(!limiter.try_acquire(5).await.unwrap());
    }
}
