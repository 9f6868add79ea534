//! Error types for kvlock
//!
//! `KvError` covers configuration, store round trips and lock acquisition.
//! `LockError` is what `with_lock` hands back: it keeps "could not get the
//! lock" apart from "the callback itself failed".

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for kvlock operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Store error: {0}")]
    Store(String),

    // -------------------------------------------------------------------------
    // Lock Errors
    // -------------------------------------------------------------------------
    #[error("Lock not acquired for {resource}: {acquired} of {quorum} required endpoints")]
    LockNotAcquired {
        resource: String,
        acquired: usize,
        quorum: usize,
    },

    #[error("Lock release failed for {resource} on {failed} of {total} endpoints")]
    ReleaseFailed {
        resource: String,
        failed: usize,
        total: usize,
    },
}

impl KvError {
    /// True when the error means the lock was held elsewhere (or the quorum
    /// could not be reached in time), as opposed to a configuration fault.
    pub fn is_lock_not_acquired(&self) -> bool {
        matches!(self, KvError::LockNotAcquired { .. })
    }
}

/// Error returned by `with_lock`
#[derive(Debug, Error)]
pub enum LockError<E> {
    /// The mutex was never held; the callback did not run
    #[error(transparent)]
    NotAcquired(KvError),

    /// The mutex was held and released; the callback failed
    #[error("callback failed under distributed lock: {0}")]
    Callback(CallbackError<E>),
}

/// How a unit-of-work failed while the lock was held
#[derive(Debug, Error)]
pub enum CallbackError<E> {
    /// The callback returned an error
    #[error("{0}")]
    Failed(E),

    /// The callback panicked; the panic was caught after the lock was released
    #[error("callback panicked: {0}")]
    Panicked(String),
}

impl<E> LockError<E> {
    /// The callback's own error, if that is what failed
    pub fn callback_error(&self) -> Option<&E> {
        match self {
            LockError::Callback(CallbackError::Failed(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, LockError::Callback(CallbackError::Panicked(_)))
    }
}
