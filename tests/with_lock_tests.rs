//! Tests for with_lock
//!
//! These tests verify:
//! - The callback runs exactly once while the lock is held
//! - Release happens on success, error and panic
//! - Lock failures are distinguishable from callback failures
//! - Mutual exclusion between concurrent callers

mod common;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{endpoints, endpoints_with, pool_of, Fault};
use kvlock::lock::with_lock;
use kvlock::{CallbackError, KvError, LockError, MutexOptions};

const RESOURCE: &str = "mutex.report";

fn options() -> MutexOptions {
    MutexOptions {
        ttl: Duration::from_secs(5),
        drift_factor: 0.01,
    }
}

// =============================================================================
// Outcome Tests
// =============================================================================

#[test]
fn test_with_lock_returns_callback_value() {
    let eps = endpoints(3);
    let pool = pool_of(&eps);

    let result: Result<u32, LockError<io::Error>> = with_lock(&pool, options(), "report", || {
        // Held on every endpoint while the callback runs
        for endpoint in &eps {
            assert!(endpoint.holder(RESOURCE).is_some());
        }
        Ok(42)
    });

    assert_eq!(result.unwrap(), 42);
    for endpoint in &eps {
        assert_eq!(endpoint.holder(RESOURCE), None);
        assert_eq!(endpoint.release_calls(), 1);
    }
}

#[test]
fn test_with_lock_callback_error_releases() {
    let eps = endpoints(3);
    let pool = pool_of(&eps);

    let result: Result<(), _> = with_lock(&pool, options(), "report", || {
        Err(io::Error::new(io::ErrorKind::Other, "report failed"))
    });

    let err = result.unwrap_err();
    assert_eq!(err.callback_error().unwrap().to_string(), "report failed");
    assert!(!err.is_panic());
    for endpoint in &eps {
        assert_eq!(endpoint.holder(RESOURCE), None);
        assert_eq!(endpoint.release_calls(), 1);
    }
}

#[test]
fn test_with_lock_panic_releases_and_reports() {
    let eps = endpoints(3);
    let pool = pool_of(&eps);

    let result: Result<(), LockError<io::Error>> =
        with_lock(&pool, options(), "report", || panic!("boom"));

    match result {
        Err(LockError::Callback(CallbackError::Panicked(message))) => {
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    for endpoint in &eps {
        assert_eq!(endpoint.holder(RESOURCE), None);
        assert_eq!(endpoint.release_calls(), 1);
    }

    // Nothing leaked: the next caller gets the lock
    let again: Result<(), LockError<io::Error>> =
        with_lock(&pool, options(), "report", || Ok(()));
    assert!(again.is_ok());
}

#[test]
fn test_with_lock_formatted_panic_message() {
    let eps = endpoints(1);
    let pool = pool_of(&eps);

    let result: Result<(), LockError<io::Error>> =
        with_lock(&pool, options(), "report", || panic!("row {} missing", 7));

    assert!(result.unwrap_err().to_string().contains("row 7 missing"));
}

#[test]
fn test_with_lock_not_acquired_skips_callback() {
    let eps = endpoints_with(&[Fault::None, Fault::Down, Fault::Down]);
    let pool = pool_of(&eps);
    let ran = AtomicBool::new(false);

    let result: Result<(), LockError<io::Error>> = with_lock(&pool, options(), "report", || {
        ran.store(true, Ordering::SeqCst);
        Ok(())
    });

    match result {
        Err(LockError::NotAcquired(e)) => assert!(e.is_lock_not_acquired()),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(eps[0].holder(RESOURCE), None);
}

#[test]
fn test_with_lock_invalid_options_not_acquired() {
    let eps = endpoints(3);
    let pool = pool_of(&eps);
    let bad = MutexOptions {
        ttl: Duration::from_secs(5),
        drift_factor: -0.5,
    };

    let result: Result<(), LockError<io::Error>> = with_lock(&pool, bad, "report", || Ok(()));

    assert!(matches!(
        result,
        Err(LockError::NotAcquired(KvError::Config(_)))
    ));
    assert_eq!(eps[0].acquire_calls(), 0);
}

#[test]
fn test_with_lock_display_forwards_lock_error() {
    let eps = endpoints_with(&[Fault::Down]);
    let pool = pool_of(&eps);

    let result: Result<(), LockError<io::Error>> = with_lock(&pool, options(), "report", || Ok(()));

    let message = result.unwrap_err().to_string();
    assert!(message.starts_with("Lock not acquired for mutex.report"));
}

#[test]
fn test_with_lock_contended_key_not_acquired() {
    let eps = endpoints(3);
    let pool = pool_of(&eps);

    let outer: Result<(), LockError<io::Error>> = with_lock(&pool, options(), "report", || {
        let inner: Result<(), LockError<io::Error>> =
            with_lock(&pool, options(), "report", || Ok(()));
        assert!(matches!(
            inner,
            Err(LockError::NotAcquired(KvError::LockNotAcquired { .. }))
        ));
        Ok(())
    });

    assert!(outer.is_ok());
}

#[test]
fn test_with_lock_release_failure_keeps_result() {
    let eps = endpoints(3);
    let pool = pool_of(&eps);

    let result: Result<&str, LockError<io::Error>> = with_lock(&pool, options(), "report", || {
        eps[0].set_fault(Fault::Down);
        Ok("done")
    });

    assert_eq!(result.unwrap(), "done");
    assert_eq!(eps[0].release_calls(), 1);
    assert_eq!(eps[1].holder(RESOURCE), None);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_with_lock_mutual_exclusion() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 10;

    let eps = endpoints(3);
    let pool = Arc::new(pool_of(&eps));
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            let completed = Arc::clone(&completed);

            thread::spawn(move || {
                let mut done = 0;
                while done < ROUNDS {
                    let result: Result<(), LockError<io::Error>> =
                        with_lock(&pool, options(), "shared", || {
                            if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            thread::sleep(Duration::from_millis(1));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        });

                    match result {
                        Ok(()) => {
                            done += 1;
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(LockError::NotAcquired(_)) => thread::yield_now(),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(completed.load(Ordering::SeqCst), THREADS * ROUNDS);
    for endpoint in &eps {
        assert_eq!(endpoint.holder("mutex.shared"), None);
    }
}
