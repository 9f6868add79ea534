//! Distributed Mutex
//!
//! ## State Machine
//! ```text
//!   IDLE ──lock()──► ACQUIRING ──quorum + validity──► HELD (MutexGuard)
//!                        │                                 │
//!                        └──otherwise──► ACQUIRE_FAILED    │ unlock() / Drop
//!                            (partial holds released)      ▼
//!                                                      RELEASED
//! ```
//!
//! A guard releases exactly once: either through `unlock()` or when dropped.

use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::Config;
use crate::error::{KvError, Result};

use super::LockPool;

/// Prefix applied to every caller-supplied lock name
pub const MUTEX_NAMESPACE: &str = "mutex.";

/// Fixed clock drift allowance added on top of the proportional margin
const CLOCK_DRIFT_ALLOWANCE: Duration = Duration::from_millis(2);

const TOKEN_LEN: usize = 22;

/// Remote key for a caller-supplied lock name
pub fn resource_key(key: &str) -> String {
    format!("{}{}", MUTEX_NAMESPACE, key)
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

// =============================================================================
// Options
// =============================================================================

/// Lease parameters of a distributed mutex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutexOptions {
    /// Lease TTL set on every endpoint
    pub ttl: Duration,

    /// Fraction of the TTL reserved for clock drift between endpoints
    pub drift_factor: f64,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(8),
            drift_factor: 0.01,
        }
    }
}

impl MutexOptions {
    /// Checked constructor; see `validate`
    pub fn new(ttl: Duration, drift_factor: f64) -> Result<Self> {
        let options = Self { ttl, drift_factor };
        options.validate()?;
        Ok(options)
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.lock_ttl,
            drift_factor: config.drift_factor,
        }
    }

    /// TTL must be positive and the drift factor in `[0, 1)`
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(KvError::Config("lock TTL must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.drift_factor) {
            return Err(KvError::Config(format!(
                "drift factor must be in [0, 1): {}",
                self.drift_factor
            )));
        }
        Ok(())
    }

    /// Drift margin subtracted from the validity window; `None` when the
    /// drift factor cannot produce a duration
    pub fn drift(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.ttl.as_secs_f64() * self.drift_factor)
            .ok()?
            .checked_add(CLOCK_DRIFT_ALLOWANCE)
    }

    /// Remaining validity after `elapsed`; `None` when non-positive
    pub fn validity(&self, elapsed: Duration) -> Option<Duration> {
        let margin = elapsed.checked_add(self.drift()?)?;
        self.ttl
            .checked_sub(margin)
            .filter(|validity| !validity.is_zero())
    }
}

// =============================================================================
// Mutex
// =============================================================================

/// A named lock over a `LockPool`, created per acquisition attempt
pub struct DistributedMutex<'a> {
    pool: &'a LockPool,
    resource: String,
    options: MutexOptions,
}

impl<'a> DistributedMutex<'a> {
    /// Mutex for `key`; the remote resource is `mutex.<key>`
    pub fn new(pool: &'a LockPool, key: &str, options: MutexOptions) -> Self {
        Self {
            pool,
            resource: resource_key(key),
            options,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn options(&self) -> &MutexOptions {
        &self.options
    }

    /// Try once to take the lock on a quorum of endpoints.
    ///
    /// Invalid options fail with `KvError::Config` before any endpoint is
    /// contacted.
    ///
    /// Steps:
    /// 1. Generate a fresh token for this attempt
    /// 2. `try_acquire` on every endpoint in parallel, timing the round
    /// 3. HELD iff acquired >= quorum and the validity window is positive
    /// 4. Otherwise release every endpoint that may hold the token
    ///
    /// No retry: a caller wanting one backs off and calls again.
    pub fn lock(&self) -> Result<MutexGuard<'a>> {
        self.options.validate()?;

        let token = generate_token();
        let ttl = self.options.ttl;
        let all: Vec<usize> = (0..self.pool.len()).collect();

        let started = Instant::now();
        let results = self
            .pool
            .fan_out(&all, |endpoint| endpoint.try_acquire(&self.resource, &token, ttl));
        let elapsed = started.elapsed();

        let mut acquired = 0;
        // Endpoints that accepted the token, plus those whose reply was lost;
        // a timed-out SET may still have landed.
        let mut holders = Vec::with_capacity(all.len());
        for (index, result) in results {
            let endpoint = self.pool.endpoints()[index].name();
            match result {
                Ok(true) => {
                    acquired += 1;
                    holders.push(index);
                }
                Ok(false) => {
                    tracing::trace!(endpoint, resource = %self.resource, "resource held elsewhere");
                }
                Err(e) => {
                    holders.push(index);
                    tracing::warn!(
                        endpoint,
                        resource = %self.resource,
                        error = %e,
                        "lock endpoint failed during acquire"
                    );
                }
            }
        }

        let quorum = self.pool.quorum();
        match self.options.validity(elapsed) {
            Some(validity) if acquired >= quorum => {
                tracing::debug!(
                    resource = %self.resource,
                    acquired,
                    quorum,
                    ?validity,
                    "acquired distributed lock"
                );
                Ok(MutexGuard {
                    pool: self.pool,
                    resource: self.resource.clone(),
                    token,
                    options: self.options,
                    holders,
                    acquired_at: started,
                    validity,
                    released: false,
                })
            }
            _ => {
                if let Err(e) = self.pool.release(&holders, &self.resource, &token) {
                    tracing::warn!(resource = %self.resource, error = %e, "failed to release partial lock");
                }
                Err(KvError::LockNotAcquired {
                    resource: self.resource.clone(),
                    acquired,
                    quorum,
                })
            }
        }
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Proof that the mutex is HELD.
///
/// Releases the lock on every endpoint that may hold the token, exactly
/// once: on `unlock()`, or on drop if `unlock()` was never called.
pub struct MutexGuard<'a> {
    pool: &'a LockPool,
    resource: String,
    token: String,
    options: MutexOptions,
    holders: Vec<usize>,
    acquired_at: Instant,
    validity: Duration,
    released: bool,
}

impl<'a> MutexGuard<'a> {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Random token identifying this holder
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Validity window computed when the lease was (re)armed
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Time left before exclusivity can no longer be assumed
    pub fn remaining(&self) -> Duration {
        self.validity.saturating_sub(self.acquired_at.elapsed())
    }

    pub fn is_valid(&self) -> bool {
        !self.remaining().is_zero()
    }

    /// Re-arm the lease to the full TTL on a quorum of endpoints.
    ///
    /// On success the validity window restarts from the moment the extend
    /// round began. On failure the guard still releases on drop.
    pub fn extend(&mut self) -> Result<()> {
        let ttl = self.options.ttl;
        let all: Vec<usize> = (0..self.pool.len()).collect();

        let started = Instant::now();
        let results = self
            .pool
            .fan_out(&all, |endpoint| endpoint.extend(&self.resource, &self.token, ttl));
        let elapsed = started.elapsed();

        let mut extended = 0;
        let mut holders = Vec::with_capacity(all.len());
        for (index, result) in results {
            match result {
                Ok(true) => {
                    extended += 1;
                    holders.push(index);
                }
                Ok(false) => {}
                Err(e) => {
                    holders.push(index);
                    tracing::warn!(
                        endpoint = self.pool.endpoints()[index].name(),
                        resource = %self.resource,
                        error = %e,
                        "lock endpoint failed during extend"
                    );
                }
            }
        }
        self.holders = holders;

        let quorum = self.pool.quorum();
        match self.options.validity(elapsed) {
            Some(validity) if extended >= quorum => {
                self.acquired_at = started;
                self.validity = validity;
                tracing::debug!(resource = %self.resource, extended, "extended distributed lock");
                Ok(())
            }
            _ => Err(KvError::LockNotAcquired {
                resource: self.resource.clone(),
                acquired: extended,
                quorum,
            }),
        }
    }

    /// Release the lock now, reporting endpoints that failed to release
    pub fn unlock(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let result = self.pool.release(&self.holders, &self.resource, &self.token);
        if result.is_ok() {
            tracing::debug!(resource = %self.resource, "released distributed lock");
        }
        result
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(resource = %self.resource, error = %e, "lock release on drop failed");
        }
    }
}

impl std::fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexGuard")
            .field("resource", &self.resource)
            .field("holders", &self.holders)
            .field("validity", &self.validity)
            .field("released", &self.released)
            .finish()
    }
}
