//! Shared helpers for integration tests
//!
//! `FlakyEndpoint` wraps a `MemTable` lock endpoint and can be told to fail
//! or stall, so quorum behavior can be tested without real servers.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kvlock::{KvError, LockEndpoint, LockPool, MemTable, Result};
use parking_lot::Mutex;

// =============================================================================
// Fault Injection
// =============================================================================

/// How a `FlakyEndpoint` misbehaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// Behave like the wrapped MemTable
    None,

    /// Every call fails with a timeout
    Down,

    /// Every call sleeps before reaching the MemTable
    Slow(Duration),

    /// Every call panics
    Panic,
}

pub struct FlakyEndpoint {
    pub inner: MemTable,
    fault: Mutex<Fault>,
    acquires: AtomicUsize,
    releases: AtomicUsize,
}

impl FlakyEndpoint {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemTable::named(name),
            fault: Mutex::new(Fault::None),
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn with_fault(name: &str, fault: Fault) -> Self {
        let endpoint = Self::new(name);
        endpoint.set_fault(fault);
        endpoint
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Token currently stored for `resource`, if any
    pub fn holder(&self, resource: &str) -> Option<String> {
        kvlock::KeyValueStore::get(&self.inner, resource).ok()
    }

    fn inject(&self) -> Result<()> {
        let fault = *self.fault.lock();
        match fault {
            Fault::None => Ok(()),
            Fault::Down => Err(timeout()),
            Fault::Slow(delay) => {
                thread::sleep(delay);
                Ok(())
            }
            Fault::Panic => panic!("lock endpoint {} crashed", self.inner.name()),
        }
    }
}

pub fn timeout() -> KvError {
    KvError::Connection(redis::RedisError::from(io::Error::new(
        io::ErrorKind::TimedOut,
        "simulated timeout",
    )))
}

impl LockEndpoint for FlakyEndpoint {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn try_acquire(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.inject()?;
        self.inner.try_acquire(resource, token, ttl)
    }

    fn release(&self, resource: &str, token: &str) -> Result<bool> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inject()?;
        self.inner.release(resource, token)
    }

    fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.inject()?;
        self.inner.extend(resource, token, ttl)
    }
}

// =============================================================================
// Pool Helpers
// =============================================================================

/// `n` healthy endpoints named `lock-0..n`
pub fn endpoints(n: usize) -> Vec<Arc<FlakyEndpoint>> {
    (0..n)
        .map(|i| Arc::new(FlakyEndpoint::new(&format!("lock-{}", i))))
        .collect()
}

/// Endpoints with the given faults, in order
pub fn endpoints_with(faults: &[Fault]) -> Vec<Arc<FlakyEndpoint>> {
    faults
        .iter()
        .enumerate()
        .map(|(i, fault)| Arc::new(FlakyEndpoint::with_fault(&format!("lock-{}", i), *fault)))
        .collect()
}

pub fn pool_of(endpoints: &[Arc<FlakyEndpoint>]) -> LockPool {
    let endpoints = endpoints
        .iter()
        .map(|endpoint| Arc::clone(endpoint) as Arc<dyn LockEndpoint>)
        .collect();
    LockPool::from_endpoints(endpoints).unwrap()
}
