//! Scalar and list key spaces owned by one shard
//!
//! Every mutation revokes outstanding leases on its key before it is applied,
//! and keeps the revocation guard alive until the store lock is released.

use crate::common::{Lease, ListReply, Status, ValueReply};
use crate::shard::lease::LeaseManager;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct DataStore {
    values: RwLock<HashMap<String, String>>,
    lists: RwLock<HashMap<String, Vec<String>>>,
    leases: LeaseManager,
}

impl DataStore {
    pub fn new(leases: LeaseManager) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            lists: RwLock::new(HashMap::new()),
            leases,
        }
    }

    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    pub fn get(&self, key: &str, want_lease: bool, client_addr: &str) -> ValueReply {
        let found = self.leases.read_with_lease(key, client_addr, want_lease, || {
            self.values.read().unwrap().get(key).cloned()
        });
        match found {
            Some((value, lease)) => ValueReply {
                status: Status::Ok,
                value,
                lease,
            },
            None => ValueReply::status(Status::KeyNotFound),
        }
    }

    pub async fn put(&self, key: &str, value: &str) -> Status {
        let _guard = self.leases.revoke(key).await;
        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Status::Ok
    }

    pub async fn delete(&self, key: &str) -> Status {
        if !self.values.read().unwrap().contains_key(key) {
            return Status::KeyNotFound;
        }
        let _guard = self.leases.revoke(key).await;
        // a concurrent delete may have won while we were revoking
        match self.values.write().unwrap().remove(key) {
            Some(_) => Status::Ok,
            None => Status::KeyNotFound,
        }
    }

    /// A key never appended to reads as an empty list.
    pub fn get_list(&self, key: &str, want_lease: bool, client_addr: &str) -> ListReply {
        let (value, lease) = self
            .leases
            .read_with_lease(key, client_addr, want_lease, || {
                Some(self.lists.read().unwrap().get(key).cloned().unwrap_or_default())
            })
            .unwrap_or_else(|| (Vec::new(), Lease::denied()));
        ListReply {
            status: Status::Ok,
            value,
            lease,
        }
    }

    pub async fn append_to_list(&self, key: &str, item: &str) -> Status {
        let _guard = self.leases.revoke(key).await;
        let mut lists = self.lists.write().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        if list.iter().any(|v| v == item) {
            return Status::ItemExists;
        }
        list.push(item.to_string());
        Status::Ok
    }

    pub async fn remove_from_list(&self, key: &str, item: &str) -> Status {
        let _guard = self.leases.revoke(key).await;
        let mut lists = self.lists.write().unwrap();
        let Some(list) = lists.get_mut(key) else {
            return Status::ItemNotFound;
        };
        match list.iter().position(|v| v == item) {
            Some(idx) => {
                list.remove(idx);
                Status::Ok
            }
            None => Status::ItemNotFound,
        }
    }

    /// Number of scalar keys and list keys held.
    pub fn len(&self) -> (usize, usize) {
        (
            self.values.read().unwrap().len(),
            self.lists.read().unwrap().len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{LeaseConfig, Result};
    use crate::shard::lease::Revoker;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingRevoker {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[tonic::async_trait]
    impl Revoker for RecordingRevoker {
        async fn revoke_lease(&self, client_addr: &str, key: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((client_addr.to_string(), key.to_string()));
            Ok(())
        }
    }

    fn store(thresh: usize) -> (DataStore, Arc<RecordingRevoker>) {
        let revoker = Arc::new(RecordingRevoker::default());
        let config = LeaseConfig {
            query_cache_thresh: thresh,
            ..LeaseConfig::default()
        };
        (
            DataStore::new(LeaseManager::new(config, revoker.clone())),
            revoker,
        )
    }

    #[tokio::test]
    async fn test_get_put_delete() {
        let (store, _) = store(3);
        assert_eq!(store.get("x", false, "").status, Status::KeyNotFound);
        assert_eq!(store.put("x", "1").await, Status::Ok);

        let reply = store.get("x", false, "");
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.value, "1");

        assert_eq!(store.put("x", "2").await, Status::Ok);
        assert_eq!(store.get("x", false, "").value, "2");

        assert_eq!(store.delete("x").await, Status::Ok);
        assert_eq!(store.get("x", false, "").status, Status::KeyNotFound);
        assert_eq!(store.delete("x").await, Status::KeyNotFound);
    }

    #[tokio::test]
    async fn test_list_scenario() {
        let (store, _) = store(3);
        assert_eq!(store.append_to_list("friends", "bob").await, Status::Ok);
        assert_eq!(store.append_to_list("friends", "bob").await, Status::ItemExists);
        assert_eq!(store.get_list("friends", false, "").value, vec!["bob"]);
        assert_eq!(store.remove_from_list("friends", "bob").await, Status::Ok);

        let reply = store.get_list("friends", false, "");
        assert_eq!(reply.status, Status::Ok);
        assert!(reply.value.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_list_is_empty() {
        let (store, _) = store(3);
        let reply = store.get_list("nobody", false, "");
        assert_eq!(reply.status, Status::Ok);
        assert!(reply.value.is_empty());
        assert_eq!(
            store.remove_from_list("nobody", "x").await,
            Status::ItemNotFound
        );
    }

    #[tokio::test]
    async fn test_remove_missing_leaves_list() {
        let (store, _) = store(3);
        store.append_to_list("l", "a").await;
        store.append_to_list("l", "b").await;
        assert_eq!(store.remove_from_list("l", "zzz").await, Status::ItemNotFound);
        assert_eq!(store.get_list("l", false, "").value, vec!["a", "b"]);
        assert_eq!(store.remove_from_list("l", "a").await, Status::Ok);
        assert_eq!(store.get_list("l", false, "").value, vec!["b"]);
    }

    #[tokio::test]
    async fn test_put_revokes_lease_holder() {
        let (store, revoker) = store(1);
        store.put("x", "1").await;
        let reply = store.get("x", true, "client:7000");
        assert!(reply.lease.granted);

        assert_eq!(store.put("x", "2").await, Status::Ok);
        assert_eq!(
            revoker.calls.lock().unwrap().clone(),
            vec![("client:7000".to_string(), "x".to_string())]
        );
        assert!(store.leases().holders("x").is_empty());
    }

    #[tokio::test]
    async fn test_every_mutation_revokes() {
        let (store, revoker) = store(1);
        store.put("k", "v").await;
        store.append_to_list("k", "a").await;

        store.get("k", true, "c:1");
        store.delete("k").await;
        store.get_list("k", true, "c:1");
        store.append_to_list("k", "b").await;
        store.get_list("k", true, "c:1");
        store.remove_from_list("k", "a").await;

        assert_eq!(revoker.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_key_gets_no_lease() {
        let (store, _) = store(1);
        let reply = store.get("ghost", true, "c:1");
        assert_eq!(reply.status, Status::KeyNotFound);
        assert!(!reply.lease.granted);
        assert!(store.leases().holders("ghost").is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_list_unique() {
        let (store, _) = store(3);
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append_to_list("l", &format!("v{}", i % 8)).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap() == Status::Ok {
                ok += 1;
            }
        }
        assert_eq!(ok, 8);
        assert_eq!(store.get_list("l", false, "").value.len(), 8);
    }
}
