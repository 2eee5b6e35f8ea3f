//! Lease bookkeeping and revocation
//!
//! Per key the manager tracks a trailing window of read instants, the
//! clients currently holding a lease, and how many writers are between
//! revocation and commit. A lease is only granted when no write is pending,
//! and the grant happens under the same lock as the value read, so a writer
//! that starts revoking afterwards is guaranteed to see the new holder.

use crate::common::{LeaseConfig, Lease, Result};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Sends a revocation notice for `key` to a caching client.
#[tonic::async_trait]
pub trait Revoker: Send + Sync + 'static {
    async fn revoke_lease(&self, client_addr: &str, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct KeyLeases {
    accesses: VecDeque<Instant>,
    /// client callback address -> instant the shard stops honoring the lease
    holders: HashMap<String, Instant>,
    pending_writes: usize,
}

impl KeyLeases {
    fn prune(&mut self, now: Instant, window: std::time::Duration) {
        while let Some(&oldest) = self.accesses.front() {
            if now.duration_since(oldest) > window {
                self.accesses.pop_front();
            } else {
                break;
            }
        }
        self.holders.retain(|_, expiry| *expiry > now);
    }

    fn is_idle(&self) -> bool {
        self.accesses.is_empty() && self.holders.is_empty() && self.pending_writes == 0
    }
}

type LeaseTable = Arc<Mutex<HashMap<String, KeyLeases>>>;

/// Result of notifying every holder of a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationOutcome {
    pub acknowledged: Vec<String>,
    /// Errored or timed out; dropped locally all the same
    pub failed: Vec<String>,
}

impl RevocationOutcome {
    pub fn attempted(&self) -> usize {
        self.acknowledged.len() + self.failed.len()
    }
}

/// Held by a writer from revocation until its mutation is applied. While any
/// guard for a key is alive, reads of that key are not granted leases.
#[must_use = "dropping the guard re-enables leases before the write is applied"]
pub struct WriteGuard {
    key: String,
    table: LeaseTable,
    outcome: RevocationOutcome,
}

impl WriteGuard {
    pub fn outcome(&self) -> &RevocationOutcome {
        &self.outcome
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap();
        if let Some(entry) = table.get_mut(&self.key) {
            entry.pending_writes = entry.pending_writes.saturating_sub(1);
            if entry.is_idle() {
                table.remove(&self.key);
            }
        }
    }
}

pub struct LeaseManager {
    config: LeaseConfig,
    revoker: Arc<dyn Revoker>,
    table: LeaseTable,
}

impl LeaseManager {
    pub fn new(config: LeaseConfig, revoker: Arc<dyn Revoker>) -> Self {
        Self {
            config,
            revoker,
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Count a read of `key` and decide whether `client_addr` gets a lease.
    pub fn record_access(&self, key: &str, client_addr: &str, wants_lease: bool) -> Lease {
        self.read_with_lease(key, client_addr, wants_lease, || Some(()))
            .map(|(_, lease)| lease)
            .unwrap_or_default()
    }

    /// Run `read` and record the access atomically with respect to
    /// [`LeaseManager::revoke`]. Returns `None` without recording anything
    /// when `read` finds nothing.
    pub fn read_with_lease<T>(
        &self,
        key: &str,
        client_addr: &str,
        wants_lease: bool,
        read: impl FnOnce() -> Option<T>,
    ) -> Option<(T, Lease)> {
        let now = Instant::now();
        let mut table = self.table.lock().unwrap();
        let value = read()?;

        let entry = table.entry(key.to_string()).or_default();
        entry.accesses.push_back(now);
        entry.prune(now, self.config.query_window());

        if !wants_lease || client_addr.is_empty() {
            return Some((value, Lease::denied()));
        }
        if entry.pending_writes > 0 {
            tracing::debug!("Lease on {} denied to {}: write in progress", key, client_addr);
            return Some((value, Lease::denied()));
        }
        if entry.accesses.len() < self.config.query_cache_thresh {
            return Some((value, Lease::denied()));
        }

        entry
            .holders
            .insert(client_addr.to_string(), now + self.config.holder_term());
        tracing::debug!("Lease on {} granted to {}", key, client_addr);
        Some((value, Lease::granted(self.config.lease_seconds as i64)))
    }

    /// Notify every live holder of `key` and clear the holder set.
    ///
    /// Each notice is bounded by `revoke_timeout` (or the lease's remaining
    /// life, whichever is shorter). Failures are logged and otherwise
    /// ignored: an unacknowledged lease expires on its own. Keep the returned
    /// guard until the mutation has been applied.
    pub async fn revoke(&self, key: &str) -> WriteGuard {
        let now = Instant::now();
        let holders: Vec<(String, Instant)> = {
            let mut table = self.table.lock().unwrap();
            let entry = table.entry(key.to_string()).or_default();
            entry.pending_writes += 1;
            entry
                .holders
                .drain()
                .filter(|(_, expiry)| *expiry > now)
                .collect()
        };

        let mut guard = WriteGuard {
            key: key.to_string(),
            table: self.table.clone(),
            outcome: RevocationOutcome::default(),
        };
        if holders.is_empty() {
            return guard;
        }

        tracing::debug!("Revoking {} lease(s) on {}", holders.len(), key);
        let timeout = self.config.revoke_timeout();
        let results: Vec<(String, bool)> = stream::iter(holders)
            .map(|(client, expiry)| {
                let revoker = self.revoker.clone();
                let key = key.to_string();
                async move {
                    let limit = timeout.min(expiry.saturating_duration_since(Instant::now()));
                    let acked =
                        match tokio::time::timeout(limit, revoker.revoke_lease(&client, &key)).await
                        {
                            Ok(Ok(())) => true,
                            Ok(Err(e)) => {
                                tracing::warn!("Revoking {} from {} failed: {}", key, client, e);
                                false
                            }
                            Err(_) => {
                                tracing::warn!(
                                    "Revoking {} from {} timed out after {:?}",
                                    key,
                                    client,
                                    limit
                                );
                                false
                            }
                        };
                    (client, acked)
                }
            })
            .buffer_unordered(self.config.max_concurrent_revocations.max(1))
            .collect()
            .await;

        for (client, acked) in results {
            if acked {
                guard.outcome.acknowledged.push(client);
            } else {
                guard.outcome.failed.push(client);
            }
        }
        guard
    }

    /// Clients currently holding a live lease on `key`.
    pub fn holders(&self, key: &str) -> Vec<String> {
        let now = Instant::now();
        let table = self.table.lock().unwrap();
        let mut holders: Vec<String> = table
            .get(key)
            .map(|entry| {
                entry
                    .holders
                    .iter()
                    .filter(|(_, expiry)| **expiry > now)
                    .map(|(client, _)| client.clone())
                    .collect()
            })
            .unwrap_or_default();
        holders.sort();
        holders
    }

    /// Drop expired accesses and leases; forget keys with nothing left.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.config.query_window();
        let mut table = self.table.lock().unwrap();
        table.retain(|_, entry| {
            entry.prune(now, window);
            !entry.is_idle()
        });
        table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behavior {
        Ack,
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct MockRevoker {
        calls: Mutex<Vec<(String, String)>>,
        behavior: Mutex<HashMap<String, Behavior>>,
    }

    impl MockRevoker {
        fn with(self, client: &str, behavior: Behavior) -> Self {
            self.behavior
                .lock()
                .unwrap()
                .insert(client.to_string(), behavior);
            self
        }

        fn calls(&self) -> Vec<(String, String)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[tonic::async_trait]
    impl Revoker for MockRevoker {
        async fn revoke_lease(&self, client_addr: &str, key: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((client_addr.to_string(), key.to_string()));
            let behavior = self
                .behavior
                .lock()
                .unwrap()
                .get(client_addr)
                .copied()
                .unwrap_or(Behavior::Ack);
            match behavior {
                Behavior::Ack => Ok(()),
                Behavior::Fail => Err(crate::Error::ConnectionFailed(client_addr.to_string())),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }

    fn config(thresh: usize) -> LeaseConfig {
        LeaseConfig {
            query_cache_thresh: thresh,
            ..LeaseConfig::default()
        }
    }

    fn manager(thresh: usize, revoker: MockRevoker) -> (LeaseManager, Arc<MockRevoker>) {
        let revoker = Arc::new(revoker);
        (LeaseManager::new(config(thresh), revoker.clone()), revoker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_gates_grant() {
        let (leases, _) = manager(3, MockRevoker::default());
        assert!(!leases.record_access("k", "c1:1", true).granted);
        assert!(!leases.record_access("k", "c1:1", true).granted);
        let lease = leases.record_access("k", "c1:1", true);
        assert!(lease.granted);
        assert_eq!(lease.valid_seconds, 10);
        assert_eq!(leases.holders("k"), vec!["c1:1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_lease_unless_wanted() {
        let (leases, _) = manager(1, MockRevoker::default());
        assert_eq!(leases.record_access("k", "c1:1", false), Lease::denied());
        assert_eq!(leases.record_access("k", "", true), Lease::denied());
        assert!(leases.holders("k").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_accesses_leave_window() {
        let (leases, _) = manager(2, MockRevoker::default());
        leases.record_access("k", "c1:1", false);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!leases.record_access("k", "c1:1", true).granted);
        assert!(leases.record_access("k", "c1:1", true).granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regrant_refreshes_single_holder() {
        let (leases, revoker) = manager(1, MockRevoker::default());
        assert!(leases.record_access("k", "c1:1", true).granted);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(leases.record_access("k", "c1:1", true).granted);
        assert_eq!(leases.holders("k").len(), 1);

        // still live past the first grant's term thanks to the refresh
        tokio::time::advance(Duration::from_secs(8)).await;
        let guard = leases.revoke("k").await;
        assert_eq!(guard.outcome().acknowledged, vec!["c1:1".to_string()]);
        assert_eq!(revoker.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_leases_not_revoked() {
        let (leases, revoker) = manager(1, MockRevoker::default());
        leases.record_access("k", "c1:1", true);
        tokio::time::advance(Duration::from_secs(13)).await;
        assert!(leases.holders("k").is_empty());

        let guard = leases.revoke("k").await;
        assert_eq!(guard.outcome().attempted(), 0);
        assert!(revoker.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_period_still_revoked() {
        let (leases, revoker) = manager(1, MockRevoker::default());
        leases.record_access("k", "c1:1", true);
        tokio::time::advance(Duration::from_secs(11)).await;
        let _guard = leases.revoke("k").await;
        assert_eq!(revoker.calls(), vec![("c1:1".to_string(), "k".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_notifies_all_and_clears() {
        let revoker = MockRevoker::default()
            .with("bad:1", Behavior::Fail)
            .with("slow:1", Behavior::Hang);
        let (leases, revoker) = manager(1, revoker);
        for client in ["good:1", "bad:1", "slow:1"] {
            assert!(leases.record_access("k", client, true).granted);
        }
        leases.record_access("other", "good:1", true);

        let started = Instant::now();
        let guard = leases.revoke("k").await;
        assert!(started.elapsed() <= Duration::from_millis(2_000));

        let outcome = guard.outcome().clone();
        assert_eq!(outcome.acknowledged, vec!["good:1".to_string()]);
        let mut failed = outcome.failed.clone();
        failed.sort();
        assert_eq!(failed, vec!["bad:1".to_string(), "slow:1".to_string()]);
        assert_eq!(revoker.calls().len(), 3);
        assert!(leases.holders("k").is_empty());
        // unrelated key untouched
        assert_eq!(leases.holders("other"), vec!["good:1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_grant_while_write_pending() {
        let (leases, _) = manager(1, MockRevoker::default());
        let guard = leases.revoke("k").await;
        assert!(!leases.record_access("k", "c1:1", true).granted);
        drop(guard);
        assert!(leases.record_access("k", "c1:1", true).granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_with_lease_skips_missing() {
        let (leases, _) = manager(1, MockRevoker::default());
        let none: Option<(String, Lease)> = leases.read_with_lease("k", "c1:1", true, || None);
        assert!(none.is_none());
        assert!(leases.holders("k").is_empty());

        let (value, lease) = leases
            .read_with_lease("k", "c1:1", true, || Some("v".to_string()))
            .unwrap();
        assert_eq!(value, "v");
        assert!(lease.granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_forgets_idle_keys() {
        let (leases, _) = manager(1, MockRevoker::default());
        leases.record_access("a", "c1:1", true);
        leases.record_access("b", "c1:1", false);
        assert_eq!(leases.sweep(), 2);
        tokio::time::advance(Duration::from_secs(13)).await;
        assert_eq!(leases.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_fan_out() {
        let mut cfg = config(1);
        cfg.max_concurrent_revocations = 2;
        let mut revoker = MockRevoker::default();
        for i in 0..5 {
            revoker = revoker.with(&format!("c{}:1", i), Behavior::Hang);
        }
        let revoker = Arc::new(revoker);
        let leases = LeaseManager::new(cfg, revoker.clone());
        for i in 0..5 {
            leases.record_access("k", &format!("c{}:1", i), true);
        }

        let started = Instant::now();
        let guard = leases.revoke("k").await;
        assert_eq!(guard.outcome().failed.len(), 5);
        // three waves of at most two concurrent 2s timeouts
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(7));
    }
}
