//! Distributed Lock Module
//!
//! Quorum-based mutual exclusion across independent lock servers.
//!
//! ## Architecture
//! ```text
//!   with_lock(key, f)
//!        │
//!        ▼
//!   DistributedMutex ("mutex.<key>", fresh token)
//!        │  SET NX PX on every endpoint, in parallel
//!        ▼
//!   ┌──────────┬──────────┬──────────┐
//!   │Endpoint 0│Endpoint 1│Endpoint 2│   LockPool (one r2d2 pool each)
//!   └──────────┴──────────┴──────────┘
//!        │
//!        ▼
//!   HELD iff acquired >= n/2 + 1 and validity > 0
//!        │
//!        ▼
//!   MutexGuard ── f() ── release (token-checked DEL) exactly once
//! ```
//!
//! ## Validity
//! `validity = ttl - elapsed - (ttl * drift_factor + 2ms)`

mod coordinator;
mod endpoint;
mod mutex;
mod pool;

use std::time::Duration;

use crate::error::Result;

pub use coordinator::with_lock;
pub use endpoint::{RedisLockEndpoint, IDLE_CONNECTION_TIMEOUT, MAX_IDLE_CONNECTIONS};
pub use mutex::{resource_key, DistributedMutex, MutexGuard, MutexOptions, MUTEX_NAMESPACE};
pub use pool::LockPool;

/// One independent lock server.
///
/// Implementations only provide the per-endpoint primitives; the quorum
/// algorithm lives in `DistributedMutex`.
pub trait LockEndpoint: Send + Sync {
    /// Human-readable address for logs
    fn name(&self) -> &str;

    /// Set `resource` to `token` with a lease of `ttl` unless it is already held.
    ///
    /// Returns `Ok(false)` when another holder owns the resource.
    fn try_acquire(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `resource` only if it still holds `token`.
    ///
    /// A missing, expired or foreign lock is `Ok(false)`, never an error.
    fn release(&self, resource: &str, token: &str) -> Result<bool>;

    /// Re-arm the lease to `ttl` only if `resource` still holds `token`
    fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;
}
