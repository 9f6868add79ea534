//! Topology Selector
//!
//! Turns the configured endpoint list into one `StoreHandle`:
//!
//! ```text
//!   hosts.len() == 1  ──►  StoreHandle::Single   (db index + credential)
//!   hosts.len()  > 1  ──►  StoreHandle::Cluster  (all addresses + credential)
//! ```
//!
//! Both arms are r2d2 pools that connect lazily, so construction never
//! touches the network.

use std::time::Duration;

use redis::cluster::{ClusterClient, ClusterConnection};
use redis::{ConnectionAddr, ConnectionInfo, FromRedisValue, RedisConnectionInfo};

use crate::config::{Config, Endpoint};
use crate::error::{KvError, Result};
use crate::values::KeyValueStore;

// =============================================================================
// Store Handle
// =============================================================================

/// The one logical store connection, single node or cluster
pub enum StoreHandle {
    Single(r2d2::Pool<redis::Client>),
    Cluster(r2d2::Pool<ClusterClient>),
}

impl StoreHandle {
    /// Select and build the handle for `config.hosts`
    pub fn connect(config: &Config) -> Result<Self> {
        let Some(first) = config.hosts.first() else {
            return Err(KvError::Config("no endpoints configured".to_string()));
        };

        if config.is_cluster() {
            tracing::debug!(nodes = config.hosts.len(), "using cluster store");
            let client = cluster_client(&config.hosts, config)?;
            let pool = pool_builder(config, config.pool_size, None, false).build_unchecked(client);
            Ok(StoreHandle::Cluster(pool))
        } else {
            tracing::debug!(endpoint = %first, db = config.db_index, "using single-node store");
            let client = single_node_client(first, config)?;
            let pool = pool_builder(config, config.pool_size, None, false).build_unchecked(client);
            Ok(StoreHandle::Single(pool))
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, StoreHandle::Cluster(_))
    }

    /// Liveness check against the active handle
    pub fn ping(&self) -> Result<String> {
        self.query(&redis::cmd("PING"))
    }

    /// Run one command on whichever arm is active
    fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        match self {
            StoreHandle::Single(pool) => {
                let mut conn = pool.get()?;
                Ok(cmd.query(&mut *conn)?)
            }
            StoreHandle::Cluster(pool) => {
                let mut conn = pool.get()?;
                Ok(cmd.query(&mut *conn)?)
            }
        }
    }
}

impl KeyValueStore for StoreHandle {
    fn get(&self, key: &str) -> Result<String> {
        let value: Option<String> = self.query(redis::cmd("GET").arg(key))?;
        value.ok_or(KvError::KeyNotFound)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.query(
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(expire_millis(ttl, "set")?),
        )
    }

    fn increment(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCR").arg(key))
    }

    fn decrement(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("DECR").arg(key))
    }

    fn increment_by_float(&self, key: &str, delta: f64) -> Result<f64> {
        self.query(redis::cmd("INCRBYFLOAT").arg(key).arg(delta))
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreHandle::Single(pool) => f.debug_tuple("Single").field(&pool.state()).finish(),
            StoreHandle::Cluster(pool) => f.debug_tuple("Cluster").field(&pool.state()).finish(),
        }
    }
}

// =============================================================================
// Connection Helpers
// =============================================================================

/// Connection info for one endpoint.
///
/// The credential is attached only when non-empty; some servers reject an
/// empty AUTH during the handshake.
pub fn connection_info(endpoint: &Endpoint, config: &Config) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
        redis: RedisConnectionInfo {
            db: config.db_index,
            password: config.credential().map(str::to_string),
            ..Default::default()
        },
    }
}

/// Millisecond expiry argument for PX / PEXPIRE.
///
/// A TTL too large for the wire is an error rather than a wrapped value.
pub(crate) fn expire_millis(ttl: Duration, command: &str) -> Result<u64> {
    u64::try_from(ttl.as_millis())
        .map_err(|_| KvError::Store(format!("invalid expire time in '{}' command", command)))
}

pub(crate) fn single_node_client(endpoint: &Endpoint, config: &Config) -> Result<redis::Client> {
    redis::Client::open(connection_info(endpoint, config)).map_err(|e| {
        KvError::Config(format!("invalid endpoint {}: {}", endpoint, e))
    })
}

fn cluster_client(endpoints: &[Endpoint], config: &Config) -> Result<ClusterClient> {
    let nodes: Vec<ConnectionInfo> = endpoints
        .iter()
        .map(|endpoint| ConnectionInfo {
            addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
            redis: RedisConnectionInfo::default(),
        })
        .collect();

    let mut builder = ClusterClient::builder(nodes);
    if let Some(password) = config.credential() {
        builder = builder.password(password.to_string());
    }
    builder
        .build()
        .map_err(|e| KvError::Config(format!("invalid cluster endpoints: {}", e)))
}

/// Pool builder shared by the store and lock endpoints.
///
/// Pools start empty and apply the configured socket timeouts. With
/// `ping_on_checkout` every checkout costs an extra PING round trip, so
/// only the lock endpoints ask for it. `idle_timeout` of `None` keeps
/// r2d2's default.
pub(crate) fn pool_builder<M>(
    config: &Config,
    max_size: u32,
    idle_timeout: Option<Duration>,
    ping_on_checkout: bool,
) -> r2d2::Builder<M>
where
    M: r2d2::ManageConnection,
    IoTimeouts: r2d2::CustomizeConnection<M::Connection, M::Error>,
{
    let builder = r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
        .test_on_check_out(ping_on_checkout)
        .connection_customizer(Box::new(IoTimeouts::from_config(config)));

    match idle_timeout {
        Some(timeout) => builder.idle_timeout(Some(timeout)),
        None => builder,
    }
}

/// Applies socket read/write timeouts to every new pooled connection
#[derive(Debug, Clone, Copy)]
pub(crate) struct IoTimeouts {
    read: Option<Duration>,
    write: Option<Duration>,
}

impl IoTimeouts {
    fn from_config(config: &Config) -> Self {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            read: millis(config.read_timeout_ms),
            write: millis(config.write_timeout_ms),
        }
    }
}

impl r2d2::CustomizeConnection<redis::Connection, redis::RedisError> for IoTimeouts {
    fn on_acquire(&self, conn: &mut redis::Connection) -> std::result::Result<(), redis::RedisError> {
        conn.set_read_timeout(self.read)?;
        conn.set_write_timeout(self.write)
    }
}

impl r2d2::CustomizeConnection<ClusterConnection, redis::RedisError> for IoTimeouts {
    fn on_acquire(&self, conn: &mut ClusterConnection) -> std::result::Result<(), redis::RedisError> {
        conn.set_read_timeout(self.read)?;
        conn.set_write_timeout(self.write)
    }
}
