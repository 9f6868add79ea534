//! Lock Endpoint Pool
//!
//! Ordered, read-only set of independent lock servers. The pool supplies
//! endpoints and runs one round of calls against several of them in
//! parallel; it never decides whether a lock is held.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{KvError, Result};

use super::{LockEndpoint, RedisLockEndpoint};

/// One lock endpoint per configured host
#[derive(Clone)]
pub struct LockPool {
    endpoints: Vec<Arc<dyn LockEndpoint>>,
}

impl LockPool {
    /// Build one Redis lock endpoint per configured host
    pub fn connect(config: &Config) -> Result<Self> {
        let endpoints = config
            .hosts
            .iter()
            .map(|host| {
                RedisLockEndpoint::connect(host, config)
                    .map(|endpoint| Arc::new(endpoint) as Arc<dyn LockEndpoint>)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_endpoints(endpoints)
    }

    /// Assemble a pool from arbitrary endpoints (must be non-empty)
    pub fn from_endpoints(endpoints: Vec<Arc<dyn LockEndpoint>>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(KvError::Config(
                "lock pool requires at least one endpoint".to_string(),
            ));
        }
        Ok(Self { endpoints })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Strict majority of the endpoints
    pub fn quorum(&self) -> usize {
        self.endpoints.len() / 2 + 1
    }

    pub fn endpoints(&self) -> &[Arc<dyn LockEndpoint>] {
        &self.endpoints
    }

    /// Run `op` against the endpoints at `indices` concurrently.
    ///
    /// Returns `(index, outcome)` pairs in the order of `indices`. All calls
    /// have finished when this returns; an endpoint that panics yields
    /// `KvError::Store` for its slot.
    pub(crate) fn fan_out<F>(&self, indices: &[usize], op: F) -> Vec<(usize, Result<bool>)>
    where
        F: Fn(&dyn LockEndpoint) -> Result<bool> + Sync,
    {
        let op = &op;
        let outcome = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = indices
                .iter()
                .map(|&index| {
                    let endpoint = self.endpoints[index].as_ref();
                    (index, scope.spawn(move |_| op(endpoint)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(index, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(KvError::Store(format!(
                            "lock endpoint {} panicked",
                            self.endpoints[index].name()
                        )))
                    });
                    (index, result)
                })
                .collect::<Vec<_>>()
        });

        // Every spawned thread was joined above, so the scope itself cannot fail.
        outcome.unwrap_or_default()
    }

    /// Token-checked release on the endpoints at `indices`.
    ///
    /// Endpoints that no longer hold the token count as released. Errors are
    /// logged per endpoint and summarized as `ReleaseFailed`.
    pub(crate) fn release(&self, indices: &[usize], resource: &str, token: &str) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }

        let mut failed = 0;
        for (index, result) in self.fan_out(indices, |endpoint| endpoint.release(resource, token)) {
            let endpoint = self.endpoints[index].name();
            match result {
                Ok(true) => tracing::trace!(endpoint, resource, "released lock"),
                Ok(false) => tracing::trace!(endpoint, resource, "lock already gone"),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(endpoint, resource, error = %e, "lock release failed");
                }
            }
        }

        if failed > 0 {
            return Err(KvError::ReleaseFailed {
                resource: resource.to_string(),
                failed,
                total: indices.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for LockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.endpoints.iter().map(|endpoint| endpoint.name()))
            .finish()
    }
}
