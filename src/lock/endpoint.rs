//! Redis lock endpoint
//!
//! One pooled connection set per lock server. Acquire is `SET NX PX`;
//! release and extend are Lua scripts that compare the token first so a
//! holder can never touch a lock it no longer owns.

use std::time::Duration;

use crate::config::{Config, Endpoint};
use crate::error::Result;
use crate::topology::{expire_millis, pool_builder, single_node_client};

use super::LockEndpoint;

/// Max pooled connections per lock server.
///
/// r2d2 has no separate idle cap, so this bounds open connections as a
/// whole, not just idle ones. A fourth concurrent lock call against the same
/// server waits for a free connection (up to `connection_timeout_ms`), and
/// that wait is charged to the acquisition's validity window.
pub const MAX_IDLE_CONNECTIONS: u32 = 3;

/// Pooled connections idle longer than this are closed
pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(240);

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Lock server reached over the Redis protocol
pub struct RedisLockEndpoint {
    name: String,
    pool: r2d2::Pool<redis::Client>,
    release: redis::Script,
    extend: redis::Script,
}

impl RedisLockEndpoint {
    /// Build the endpoint's pool.
    ///
    /// Reuses the store's address, credential and database index. No
    /// connection is opened until the first lock attempt; every checkout
    /// is checked with PING so stale sockets never reach a lock attempt.
    pub fn connect(endpoint: &Endpoint, config: &Config) -> Result<Self> {
        let client = single_node_client(endpoint, config)?;
        let pool = pool_builder(config, MAX_IDLE_CONNECTIONS, Some(IDLE_CONNECTION_TIMEOUT), true)
            .build_unchecked(client);

        Ok(Self {
            name: endpoint.to_string(),
            pool,
            release: redis::Script::new(RELEASE_SCRIPT),
            extend: redis::Script::new(EXTEND_SCRIPT),
        })
    }
}

impl LockEndpoint for RedisLockEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_acquire(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let px = expire_millis(ttl, "set")?;
        let mut conn = self.pool.get()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(resource)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(px)
            .query(&mut *conn)?;
        Ok(reply.is_some())
    }

    fn release(&self, resource: &str, token: &str) -> Result<bool> {
        let mut conn = self.pool.get()?;
        let deleted: i64 = self
            .release
            .key(resource)
            .arg(token)
            .invoke(&mut *conn)?;
        Ok(deleted == 1)
    }

    fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let px = expire_millis(ttl, "pexpire")?;
        let mut conn = self.pool.get()?;
        let extended: i64 = self
            .extend
            .key(resource)
            .arg(token)
            .arg(px)
            .invoke(&mut *conn)?;
        Ok(extended == 1)
    }
}
