//! # kvlock
//!
//! A thin access layer over Redis with:
//! - Topology-aware routing (single node or cluster) behind one handle
//! - Atomic value operations: GET, SET with TTL, INCR, DECR, INCRBYFLOAT
//! - A quorum-based distributed mutex over independent lock servers
//! - Guaranteed lock release when the protected callback fails or panics
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Context                              │
//! │        get / set / increment / decrement / with_lock         │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌────────────────────────┐     ┌────────────────────────────┐
//!   │      StoreHandle       │     │     DistributedMutex       │
//!   │  Single  |  Cluster    │     │  quorum acquire / release  │
//!   └────────────────────────┘     └─────────────┬──────────────┘
//!                                                │
//!                                                ▼
//!                                  ┌────────────────────────────┐
//!                                  │         LockPool           │
//!                                  │  one endpoint per host     │
//!                                  └────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use kvlock::{Config, Context};
//!
//! let config = Config::from_env()?;
//! let context = Context::connect(&config)?;
//!
//! context.set("greeting", "hello", None)?;
//! let hits = context.increment("hits")?;
//!
//! let result = context.with_lock("report", || -> Result<u64, std::io::Error> {
//!     Ok(42)
//! });
//! # let _ = (hits, result);
//! # Ok::<(), kvlock::KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod values;
pub mod topology;
pub mod memtable;
pub mod lock;
pub mod context;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CallbackError, KvError, LockError, Result};
pub use config::{Config, Endpoint};
pub use context::Context;
pub use lock::{DistributedMutex, LockEndpoint, LockPool, MutexGuard, MutexOptions};
pub use memtable::MemTable;
pub use topology::StoreHandle;
pub use values::{KeyValueStore, DEFAULT_TTL};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvlock
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
