//! Context
//!
//! The object every operation goes through. It owns the store handle and
//! the lock pool, both derived from the same endpoint list but with
//! independent connections, and is shared by reference (or `Arc`) across
//! threads.
//!
//! ## Lifecycle
//! 1. `Config` built (builder or environment)
//! 2. `Context::connect(&config)` selects the topology and builds pools
//! 3. Value operations and `with_lock` run concurrently through `&Context`
//! 4. Dropping the context closes every pooled connection

use std::fmt;
use std::time::Duration;

use crate::config::Config;
use crate::error::{KvError, LockError, Result};
use crate::lock::{self, DistributedMutex, LockPool, MutexOptions};
use crate::topology::StoreHandle;
use crate::values::{KeyValueStore, DEFAULT_TTL};

/// Store handle, lock pool and mutex options
pub struct Context<S: KeyValueStore = StoreHandle> {
    /// Backing store for value operations
    store: S,

    /// Independent lock servers for distributed mutexes
    locks: LockPool,

    /// Lease parameters applied to every mutex
    mutex_options: MutexOptions,
}

impl Context<StoreHandle> {
    /// Validate `config`, select the store topology and build the lock pool.
    ///
    /// Pools connect lazily; the first operation performs the first round trip.
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let store = StoreHandle::connect(config)?;
        let locks = LockPool::connect(config)?;

        tracing::info!(
            endpoints = config.hosts.len(),
            cluster = store.is_cluster(),
            quorum = locks.quorum(),
            "kvlock context initialized"
        );

        Ok(Self::from_parts(store, locks).with_mutex_options(MutexOptions::from_config(config)))
    }
}

impl<S: KeyValueStore> Context<S> {
    /// Assemble a context from an existing store and lock pool
    pub fn from_parts(store: S, locks: LockPool) -> Self {
        Self {
            store,
            locks,
            mutex_options: MutexOptions::default(),
        }
    }

    /// Replace the lease parameters used by `mutex` and `with_lock`
    pub fn with_mutex_options(mut self, options: MutexOptions) -> Self {
        self.mutex_options = options;
        self
    }

    // =========================================================================
    // Value Operations
    // =========================================================================

    /// Value stored under `key`, or `KvError::KeyNotFound`
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key).map_err(|e| {
            match &e {
                KvError::KeyNotFound => tracing::debug!(key, "GET miss"),
                _ => tracing::warn!(key, error = %e, "GET failed"),
            }
            e
        })
    }

    /// Store `value` under `key`; `None` applies the 24 hour default TTL
    pub fn set(&self, key: &str, value: impl fmt::Display, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(DEFAULT_TTL);
        match self.store.set(key, &value.to_string(), ttl) {
            Ok(()) => {
                tracing::debug!(key, ?ttl, "SET value");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "SET failed");
                Err(e)
            }
        }
    }

    /// Atomically increment the integer at `key`
    pub fn increment(&self, key: &str) -> Result<i64> {
        self.counter("INCR", key, |store| store.increment(key))
    }

    /// Atomically decrement the integer at `key`
    pub fn decrement(&self, key: &str) -> Result<i64> {
        self.counter("DECR", key, |store| store.decrement(key))
    }

    /// Atomically add `delta` to the float at `key`
    pub fn increment_by_float(&self, key: &str, delta: f64) -> Result<f64> {
        self.counter("INCRBYFLOAT", key, |store| store.increment_by_float(key, delta))
    }

    fn counter<T, F>(&self, command: &str, key: &str, op: F) -> Result<T>
    where
        T: fmt::Display,
        F: FnOnce(&S) -> Result<T>,
    {
        match op(&self.store) {
            Ok(value) => {
                tracing::debug!(key, %value, "{} applied", command);
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "{} failed", command);
                Err(e)
            }
        }
    }

    // =========================================================================
    // Distributed Locks
    // =========================================================================

    /// Mutex for `key` over this context's lock pool.
    ///
    /// For callers that need the guard itself (to extend the lease or to
    /// see release failures); most callers want `with_lock`.
    pub fn mutex(&self, key: &str) -> DistributedMutex<'_> {
        DistributedMutex::new(&self.locks, key, self.mutex_options)
    }

    /// Run `f` while holding the distributed mutex for `key`
    pub fn with_lock<T, E, F>(&self, key: &str, f: F) -> std::result::Result<T, LockError<E>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        lock::with_lock(&self.locks, self.mutex_options, key, f)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &LockPool {
        &self.locks
    }

    pub fn mutex_options(&self) -> &MutexOptions {
        &self.mutex_options
    }
}

impl<S: KeyValueStore + fmt::Debug> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("store", &self.store)
            .field("locks", &self.locks)
            .field("mutex_options", &self.mutex_options)
            .finish()
    }
}
