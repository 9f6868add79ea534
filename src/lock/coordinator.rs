//! Distributed Mutex Coordinator
//!
//! Runs a unit-of-work while holding a named distributed mutex.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{CallbackError, LockError};

use super::{DistributedMutex, LockPool, MutexOptions};

/// Acquire `mutex.<key>`, run `f` exactly once, release, return `f`'s result.
///
/// - Not acquired: `LockError::NotAcquired`, `f` never runs.
/// - `f` returns `Err(e)`: lock released, then `CallbackError::Failed(e)`.
/// - `f` panics: panic caught, lock released, then `CallbackError::Panicked`.
///
/// A failed release after `f` completed is logged and does not replace
/// `f`'s result; the lease TTL bounds how long a stale lock can linger.
pub fn with_lock<T, E, F>(
    pool: &LockPool,
    options: MutexOptions,
    key: &str,
    f: F,
) -> std::result::Result<T, LockError<E>>
where
    F: FnOnce() -> std::result::Result<T, E>,
{
    let mutex = DistributedMutex::new(pool, key, options);
    let guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(resource = mutex.resource(), error = %e, "failed to acquire distributed lock");
            return Err(LockError::NotAcquired(e));
        }
    };

    tracing::debug!(resource = mutex.resource(), "executing callback under distributed lock");
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));

    if let Err(e) = guard.unlock() {
        tracing::warn!(resource = mutex.resource(), error = %e, "distributed lock released with errors");
    }

    match outcome {
        Ok(Ok(value)) => {
            tracing::debug!(resource = mutex.resource(), "executed callback under distributed lock");
            Ok(value)
        }
        Ok(Err(e)) => Err(LockError::Callback(CallbackError::Failed(e))),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(
                resource = mutex.resource(),
                panic = %message,
                "recovered from panic in callback under distributed lock"
            );
            Err(LockError::Callback(CallbackError::Panicked(message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
