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

use async_trait::async_trait;
use nftsync_network::ratelimiter::{RateLimitPolicy, RateLimiter};
use redis::{Script, aio::ConnectionManager};

// KEYS: one counter per window. ARGV: cost, then (ttl_ms, limit) per window.
// Every window is checked before any is incremented, so a rejection counts nothing.
const ACQUIRE_SCRIPT: &str = r"
local cost = tonumber(ARGV[1])
for i, key in ipairs(KEYS) do
    local limit = tonumber(ARGV[i * 2 + 1])
    local used = tonumber(redis.call('GET', key) or '0')
    if used + cost > limit then
        return 0
    end
end
for i, key in ipairs(KEYS) do
    local ttl = tonumber(ARGV[i * 2])
    redis.call('INCRBY', key, cost)
    if redis.call('PTTL', key) < 0 then
        redis.call('PEXPIRE', key, ttl)
    end
end
return 1
";

/// A [`RateLimiter`] whose window counters are shared by every process on the same Redis.
#[derive(Clone)]
pub struct RedisRateLimiter {
    con: ConnectionManager,
    policy: RateLimitPolicy,
    keys: Vec<String>,
    script: Script,
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RedisRateLimiter))
            .field("policy", &self.policy)
            .field("keys", &self.keys)
            .finish()
    }
}

impl RedisRateLimiter {
    /// Creates a new [`RedisRateLimiter`] with counters under `key_prefix`.
    #[must_use]
    pub fn new(con: ConnectionManager, policy: RateLimitPolicy, key_prefix: &str) -> Self {
        let keys = policy.keys(key_prefix);
        Self {
            con,
            policy,
            keys,
            script: Script::new(ACQUIRE_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    async fn try_acquire(&self, cost: u64) -> anyhow::Result<bool> {
        let mut invocation = self.script.prepare_invoke();
        for key in &self.keys {
            invocation.key(key);
        }
        invocation.arg(cost);
        for window in &self.policy.windows {
            invocation.arg(window.ttl_ms).arg(window.limit);
        }

        let mut con = self.con.clone();
        let admitted: i64 = invocation.invoke_async(&mut con).await?;
        Ok(admitted == 1)
    }
}
