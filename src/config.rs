//! Configuration for kvlock
//!
//! Centralized configuration with sensible defaults. A `Config` is built once
//! at startup, either through `Config::builder()` or from the `REDIS_*`
//! environment variables, and never mutated afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{KvError, Result};
use crate::lock::MutexOptions;

// =============================================================================
// Environment Variables
// =============================================================================

/// Comma-separated list of `host:port` endpoints (required)
pub const ENV_HOSTS: &str = "REDIS_HOSTS";

/// Logical database index (single-node only)
pub const ENV_DB_INDEX: &str = "REDIS_DB_INDEX";

/// Shared credential for every endpoint
pub const ENV_PASSWORD: &str = "REDIS_PASSWORD";

/// Log verbosity (`DEBUG`, `INFO`, `WARNING`, ...)
pub const ENV_LOG_LEVEL: &str = "REDIS_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: &str = "INFO";

// =============================================================================
// Endpoint
// =============================================================================

/// Network address of one store or lock server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = KvError;

    /// Parse `host:port`, tolerating surrounding whitespace and bracketed
    /// IPv6 hosts (`[::1]:6379`)
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (host, port) = trimmed.rsplit_once(':').ok_or_else(|| {
            KvError::Config(format!("endpoint '{}' is missing a port", trimmed))
        })?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(KvError::Config(format!(
                "endpoint '{}' is missing a host",
                trimmed
            )));
        }

        let port = port.parse::<u16>().map_err(|e| {
            KvError::Config(format!("endpoint '{}' has an invalid port: {}", trimmed, e))
        })?;

        Ok(Self::new(host, port))
    }
}

// =============================================================================
// Config
// =============================================================================

/// Main configuration for a kvlock context
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Topology Configuration
    // -------------------------------------------------------------------------
    /// Ordered endpoint list.
    /// Exactly one endpoint selects a single-node store; more selects cluster.
    /// Every endpoint also backs one independent lock server connection.
    pub hosts: Vec<Endpoint>,

    /// Optional credential; an empty string is treated as absent
    pub password: Option<String>,

    /// Logical database index (ignored in cluster mode)
    pub db_index: i64,

    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Max pooled connections for value operations
    pub pool_size: u32,

    /// Max time to wait for a pooled connection (milliseconds)
    pub connection_timeout_ms: u64,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    /// Lease TTL of a distributed mutex
    pub lock_ttl: Duration,

    /// Fraction of the lease TTL reserved for clock drift
    pub drift_factor: f64,

    // -------------------------------------------------------------------------
    // Logging Configuration
    // -------------------------------------------------------------------------
    /// Log verbosity as given by the operator (`DEBUG`, `INFO`, `WARNING`, ...)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: vec![Endpoint::new("127.0.0.1", 6379)],
            password: None,
            db_index: 0,
            pool_size: 10,
            connection_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            lock_ttl: Duration::from_secs(8),
            drift_factor: 0.01,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset. `REDIS_HOSTS` is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let hosts = var(ENV_HOSTS)
            .ok_or_else(|| {
                KvError::Config(format!("failed to parse {} from environment", ENV_HOSTS))
            })
            .and_then(|raw| parse_hosts(&raw))?;

        let mut builder = Config::builder().hosts(hosts);

        if let Some(raw) = var(ENV_DB_INDEX) {
            let idx = raw.trim().parse::<i8>().map_err(|e| {
                KvError::Config(format!(
                    "failed to parse {} from environment; {}",
                    ENV_DB_INDEX, e
                ))
            })?;
            builder = builder.db_index(i64::from(idx));
        }

        if let Some(password) = var(ENV_PASSWORD) {
            builder = builder.password(password);
        }

        if let Some(level) = var(ENV_LOG_LEVEL) {
            builder = builder.log_level(level.trim());
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that every context relies on
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(KvError::Config("no endpoints configured".to_string()));
        }
        if !(0..=i64::from(i8::MAX)).contains(&self.db_index) {
            return Err(KvError::Config(format!(
                "invalid database index: {}",
                self.db_index
            )));
        }
        if self.pool_size == 0 {
            return Err(KvError::Config("pool size must be positive".to_string()));
        }
        MutexOptions::from_config(self).validate()
    }

    /// Credential to send during the handshake, if any
    pub fn credential(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// True when more than one endpoint is configured
    pub fn is_cluster(&self) -> bool {
        self.hosts.len() > 1
    }

    /// `tracing` filter directive for the configured log level
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" | "ERR" | "CRITICAL" | "PANIC" => "error",
            _ => "info",
        }
    }
}

/// Split a comma-separated endpoint list, trimming each entry
pub fn parse_hosts(raw: &str) -> Result<Vec<Endpoint>> {
    let hosts = raw
        .split(',')
        .filter(|h| !h.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Endpoint>>>()?;

    if hosts.is_empty() {
        return Err(KvError::Config(format!("no endpoints in '{}'", raw)));
    }
    Ok(hosts)
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Replace the endpoint list
    pub fn hosts(mut self, hosts: Vec<Endpoint>) -> Self {
        self.config.hosts = hosts;
        self
    }

    /// Set the credential (empty strings are dropped)
    pub fn password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.config.password = if password.is_empty() {
            None
        } else {
            Some(password)
        };
        self
    }

    /// Set the logical database index
    pub fn db_index(mut self, idx: i64) -> Self {
        self.config.db_index = idx;
        self
    }

    /// Set the maximum pooled connections for value operations
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the pool checkout timeout (in milliseconds)
    pub fn connection_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connection_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the lease TTL of distributed mutexes
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.config.lock_ttl = ttl;
        self
    }

    /// Set the clock drift factor
    pub fn drift_factor(mut self, factor: f64) -> Self {
        self.config.drift_factor = factor;
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
