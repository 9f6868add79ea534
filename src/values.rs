//! Value Operations
//!
//! The small atomic API every backing store exposes. Each call is a single
//! round trip; nothing here retries.

use std::time::Duration;

use crate::error::Result;

/// TTL applied by `set` when the caller gives none
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A store supporting GET / SET with expiry / INCR / DECR / INCRBYFLOAT
pub trait KeyValueStore: Send + Sync {
    /// Stored value for `key`, or `KvError::KeyNotFound`
    fn get(&self, key: &str) -> Result<String>;

    /// Store `value` under `key`, expiring after `ttl`.
    ///
    /// The TTL is passed to the store as given; a zero TTL is the store's to
    /// reject, not a request for "no expiry".
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically add one; a missing key counts as 0
    fn increment(&self, key: &str) -> Result<i64>;

    /// Atomically subtract one; a missing key counts as 0
    fn decrement(&self, key: &str) -> Result<i64>;

    /// Atomically add `delta` (may be negative); a missing key counts as 0
    fn increment_by_float(&self, key: &str, delta: f64) -> Result<f64>;
}
