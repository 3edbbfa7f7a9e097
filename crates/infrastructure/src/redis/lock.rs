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

use std::time::Duration;

use async_trait::async_trait;
use nftsync_common::lock::{LockManager, LockToken};
use redis::{Script, aio::ConnectionManager};

const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// A [`LockManager`] over `SET NX PX` with a scripted compare-and-delete release.
#[derive(Clone)]
pub struct RedisLockManager {
    con: ConnectionManager,
    release: Script,
}

impl std::fmt::Debug for RedisLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RedisLockManager)).finish()
    }
}

impl RedisLockManager {
    /// Creates a new [`RedisLockManager`] instance.
    #[must_use]
    pub fn new(con: ConnectionManager) -> Self {
        Self {
            con,
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<LockToken>> {
        let token = LockToken::generate();
        let ttl_ms = u64::try_from(ttl.as_millis())?.max(1);
        let mut con = self.con.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut con)
            .await?;
        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> anyhow::Result<bool> {
        let mut con = self.con.clone();
        let deleted: i64 = self
            .release
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut con)
            .await?;
        Ok(deleted == 1)
    }
}
