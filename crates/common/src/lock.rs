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

//! Best-effort distributed mutual exclusion.
//!
//! A lock is a key holding an opaque owner token with an expiry. Acquisition never blocks: on
//! contention the caller gets `None` and decides whether to skip, poll or requeue. Release is a
//! compare-and-delete, so a holder whose lock expired and was re-acquired by someone else cannot
//! release the newer lock. A crash inside a critical section is recovered by expiry, which can
//! let two workers overlap briefly; stored state relies on hash-keyed idempotency, not on the
//! lock alone.

use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

/// The opaque proof of ownership returned by a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A token-owned, TTL-bounded lock over a shared store.
#[async_trait]
pub trait LockManager: Debug + Send + Sync {
    /// Sets `key` to a fresh token with expiry `ttl` if and only if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<LockToken>>;

    /// Deletes `key` only if it still holds `token`; returns whether it was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn release(&self, key: &str, token: &LockToken) -> anyhow::Result<bool>;
}

/// Runs `critical` while holding `key`, returning `Ok(None)` without running it on contention.
///
/// The lock is released whether `critical` succeeds or fails; a failed release is logged since
/// the lock expires on its own.
///
/// # Errors
///
/// Returns an error if acquisition fails or `critical` fails.
pub async fn with_lock<T, F, Fut>(
    locks: &dyn LockManager,
    key: &str,
    ttl: Duration,
    critical: F,
) -> anyhow::Result<Option<T>>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = anyhow::Result<T>> + Send,
{
    let Some(token) = locks.acquire(key, ttl).await? else {
        return Ok(None);
    };

    let result = critical().await;

    match locks.release(key, &token).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("Lock {key} expired before release"),
        Err(e) => tracing::warn!("Failed to release lock {key}: {e}"),
    }

    result.map(Some)
}

#[derive(Debug)]
struct Held {
    token: LockToken,
    expires_at: Instant,
}

/// A process-local [`LockManager`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockManager {
    held: Arc<Mutex<HashMap<String, Held>>>,
}

impl InMemoryLockManager {
    /// Creates a new [`InMemoryLockManager`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<LockToken>> {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        if held.get(key).is_some_and(|h| h.expires_at > now) {
            return Ok(None);
        }

        let token = LockToken::generate();
        held.insert(
            key.to_string(),
            Held {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> anyhow::Result<bool> {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        match held.get(key) {
            Some(h) if h.token == *token && h.expires_at > now => {
                held.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[rstest]
    #[tokio::test]
    async fn test_second_acquire_fails_until_release() {
        let locks = InMemoryLockManager::new();
        let token = locks.acquire("k", TTL).await.unwrap().unwrap();
        assert!(locks.acquire("k", TTL).await.unwrap().is_none());

        assert!(locks.release("k", &token).await.unwrap());
        assert!(locks.acquire("k", TTL).await.unwrap().is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn test_release_with_foreign_token_is_refused() {
        let locks = InMemoryLockManager::new();
        let _token = locks.acquire("k", TTL).await.unwrap().unwrap();

        assert!(!locks.release("k", &LockToken::generate()).await.unwrap());
        assert!(locks.acquire("k", TTL).await.unwrap().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_expired_lock_can_be_taken_and_old_holder_cannot_release() {
        let locks = InMemoryLockManager::new();
        let stale = locks
            .acquire("k", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh = locks.acquire("k", TTL).await.unwrap().unwrap();
        assert!(!locks.release("k", &stale).await.unwrap());
        assert!(locks.release("k", &fresh).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn test_concurrent_acquires_single_winner() {
        let locks = InMemoryLockManager::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                locks.acquire("contended", TTL).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_with_lock_skips_on_contention_and_releases() {
        let locks = InMemoryLockManager::new();
        let outer = locks.acquire("k", TTL).await.unwrap().unwrap();

        let skipped = with_lock(&locks, "k", TTL, || async { Ok(1) }).await.unwrap();
        assert_eq!(skipped, None);

        locks.release("k", &outer).await.unwrap();
        let ran = with_lock(&locks, "k", TTL, || async { Ok(2) }).await.unwrap();
        assert_eq!(ran, Some(2));
        assert!(locks.acquire("k", TTL).await.unwrap().is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let locks = InMemoryLockManager::new();
        let result: anyhow::Result<Option<()>> =
            with_lock(&locks, "k", TTL, || async { anyhow::bail!("boom") }).await;
        assert!(result.is_err());
        assert!(locks.acquire("k", TTL).await.unwrap().is_some());
    }
}
