//! MemTable implementation
//!
//! HashMap-based table with RwLock for concurrency.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::{KvError, Result};
use crate::lock::LockEndpoint;
use crate::values::KeyValueStore;

use super::MemTableEntry;

/// In-memory store and lock endpoint
pub struct MemTable {
    /// Name reported in logs when used as a lock endpoint
    name: String,

    data: RwLock<HashMap<String, MemTableEntry>>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty MemTable reporting `name` as its endpoint name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Remaining lifetime of `key`.
    ///
    /// `None` if the key does not exist; `Some(None)` if it never expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let data = self.data.read();
        data.get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.map(|at| at.saturating_duration_since(now)))
    }

    /// Remove `key`; returns whether a live entry was removed
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.data
            .write()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired(now));
        before - data.len()
    }

    /// Read-modify-write on a live numeric value, keeping its expiry.
    ///
    /// A missing (or expired) key starts from the type's zero and never
    /// expires, as with Redis INCR on a fresh key.
    fn update<T, F>(&self, key: &str, parse_error: &str, apply: F) -> Result<T>
    where
        T: std::str::FromStr + Default + ToString + Copy,
        F: FnOnce(T) -> Result<T>,
    {
        let now = Instant::now();
        let mut data = self.data.write();

        let (current, expires_at) = match data.get(key).filter(|entry| !entry.is_expired(now)) {
            Some(entry) => {
                let current = entry
                    .value
                    .parse::<T>()
                    .map_err(|_| KvError::Store(parse_error.to_string()))?;
                (current, entry.expires_at)
            }
            None => (T::default(), None),
        };

        let next = apply(current)?;
        data.insert(
            key.to_string(),
            MemTableEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        self.update(key, "value is not an integer or out of range", |current: i64| {
            current
                .checked_add(delta)
                .ok_or_else(|| KvError::Store("increment or decrement would overflow".to_string()))
        })
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute expiry for `ttl`; zero or unrepresentable lifetimes are rejected
fn expiry(ttl: Duration, command: &str) -> Result<Instant> {
    Instant::now()
        .checked_add(ttl)
        .filter(|_| !ttl.is_zero())
        .ok_or_else(|| KvError::Store(format!("invalid expire time in '{}' command", command)))
}

// =============================================================================
// Value Operations
// =============================================================================

impl KeyValueStore for MemTable {
    fn get(&self, key: &str) -> Result<String> {
        let now = Instant::now();
        self.data
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
            .ok_or(KvError::KeyNotFound)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = expiry(ttl, "set")?;
        self.data.write().insert(
            key.to_string(),
            MemTableEntry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    fn increment(&self, key: &str) -> Result<i64> {
        self.adjust(key, 1)
    }

    fn decrement(&self, key: &str) -> Result<i64> {
        self.adjust(key, -1)
    }

    fn increment_by_float(&self, key: &str, delta: f64) -> Result<f64> {
        self.update(key, "value is not a valid float", |current: f64| {
            let next = current + delta;
            if next.is_finite() {
                Ok(next)
            } else {
                Err(KvError::Store(
                    "increment would produce NaN or Infinity".to_string(),
                ))
            }
        })
    }
}

// =============================================================================
// Lock Primitives
// =============================================================================

impl LockEndpoint for MemTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_acquire(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let expires_at = expiry(ttl, "set")?;
        let now = Instant::now();
        let mut data = self.data.write();

        if data.get(resource).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }

        data.insert(
            resource.to_string(),
            MemTableEntry {
                value: token.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(true)
    }

    fn release(&self, resource: &str, token: &str) -> Result<bool> {
        let now = Instant::now();
        let mut data = self.data.write();

        let (expired, owned) = match data.get(resource) {
            Some(entry) => (entry.is_expired(now), entry.value == token),
            None => return Ok(false),
        };

        if expired || owned {
            data.remove(resource);
        }
        Ok(owned && !expired)
    }

    fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let expires_at = expiry(ttl, "pexpire")?;
        let now = Instant::now();
        let mut data = self.data.write();

        match data.get_mut(resource) {
            Some(entry) if !entry.is_expired(now) && entry.value == token => {
                entry.expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
