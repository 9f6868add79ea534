//! MemTable Module
//!
//! In-process key-value table with per-key expiry.
//!
//! ## Responsibilities
//! - Same GET/SET/INCR/DECR/INCRBYFLOAT semantics as the Redis store
//! - Same lock primitives as a Redis lock endpoint (`SET NX PX`,
//!   token-checked delete and expire)
//! - Lazy expiry: expired entries are invisible to reads and dropped on the
//!   next write that touches them (or by `purge_expired`)
//!
//! ## Data Structure Choice
//! `HashMap` behind a `parking_lot::RwLock`:
//! - Reads (GET, TTL) share the lock
//! - Every mutation, including read-modify-write counters, takes the write
//!   lock so INCR and `SET NX` stay atomic

mod table;

use std::time::Instant;

pub use table::MemTable;

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub struct MemTableEntry {
    /// Stored value
    pub value: String,

    /// Instant after which the entry no longer exists (`None` = persistent)
    pub expires_at: Option<Instant>,
}

impl MemTableEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
