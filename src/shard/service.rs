//! Request handling for one shard: phase gating, ownership checks, and
//! delegation to the local store or the owning peer.

use crate::common::{
    validate_key, ListReply, MembershipReply, Node, Result, RoutePolicy, Status, ValueReply,
};
use crate::coordinator::MembershipCoordinator;
use crate::shard::client::RemoteShard;
use crate::shard::router::Ring;
use crate::shard::store::DataStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrapping,
    Serving,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Bootstrapping => write!(f, "bootstrapping"),
            Phase::Serving => write!(f, "serving"),
        }
    }
}

enum Route {
    NotReady,
    Local,
    Remote(Node),
}

pub struct ShardService {
    me: Node,
    route_policy: RoutePolicy,
    /// Present on the coordinator only
    coordinator: Option<Arc<MembershipCoordinator>>,
    ring: OnceLock<Ring>,
    store: DataStore,
    connect_timeout: Duration,
    request_timeout: Duration,
    peers: Mutex<HashMap<u32, RemoteShard>>,
}

impl ShardService {
    pub fn new(
        me: Node,
        route_policy: RoutePolicy,
        coordinator: Option<Arc<MembershipCoordinator>>,
        store: DataStore,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            me,
            route_policy,
            coordinator,
            ring: OnceLock::new(),
            store,
            connect_timeout,
            request_timeout,
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn node(&self) -> &Node {
        &self.me
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn ring(&self) -> Option<&Ring> {
        self.ring.get()
    }

    pub fn phase(&self) -> Phase {
        if self.ring.get().is_some() {
            Phase::Serving
        } else {
            Phase::Bootstrapping
        }
    }

    /// Move to `Serving`. Only the first call has any effect.
    pub fn start_serving(&self, ring: Ring) -> Result<()> {
        if !ring.members().iter().any(|n| n.id == self.me.id) {
            tracing::warn!("Shard {} is not part of the sealed ring", self.me);
        }
        self.ring
            .set(ring)
            .map_err(|_| crate::Error::Internal("shard already serving".into()))?;
        tracing::info!("Shard {} serving", self.me);
        Ok(())
    }

    // === Membership ===

    pub fn join(&self, node: Node) -> Result<MembershipReply> {
        let coordinator = self
            .coordinator
            .as_ref()
            .ok_or(crate::Error::NotCoordinator)?;
        Ok(coordinator.join(node))
    }

    pub fn members(&self) -> MembershipReply {
        if let Some(coordinator) = &self.coordinator {
            return coordinator.members();
        }
        match self.ring.get() {
            Some(ring) => MembershipReply::ready(ring.members().to_vec()),
            None => MembershipReply::not_ready(),
        }
    }

    // === Data ===

    pub async fn get(&self, key: &str, want_lease: bool, client_addr: &str) -> Result<ValueReply> {
        validate_key(key)?;
        Ok(match self.route(key) {
            Route::NotReady => ValueReply::status(Status::NotReady),
            Route::Local => self.store.get(key, want_lease, client_addr),
            Route::Remote(owner) => match self.peer(&owner)? {
                Some(mut peer) => peer
                    .get(key, want_lease, client_addr)
                    .await
                    .unwrap_or_else(|e| {
                        forward_failed(&owner, key, &e);
                        ValueReply::status(Status::WrongServer)
                    }),
                None => ValueReply::status(Status::WrongServer),
            },
        })
    }

    pub async fn get_list(
        &self,
        key: &str,
        want_lease: bool,
        client_addr: &str,
    ) -> Result<ListReply> {
        validate_key(key)?;
        Ok(match self.route(key) {
            Route::NotReady => ListReply::status(Status::NotReady),
            Route::Local => self.store.get_list(key, want_lease, client_addr),
            Route::Remote(owner) => match self.peer(&owner)? {
                Some(mut peer) => peer
                    .get_list(key, want_lease, client_addr)
                    .await
                    .unwrap_or_else(|e| {
                        forward_failed(&owner, key, &e);
                        ListReply::status(Status::WrongServer)
                    }),
                None => ListReply::status(Status::WrongServer),
            },
        })
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<Status> {
        validate_key(key)?;
        Ok(match self.route(key) {
            Route::NotReady => Status::NotReady,
            Route::Local => self.store.put(key, value).await,
            Route::Remote(owner) => match self.peer(&owner)? {
                Some(mut peer) => settle(&owner, key, peer.put(key, value).await),
                None => Status::WrongServer,
            },
        })
    }

    pub async fn delete(&self, key: &str) -> Result<Status> {
        validate_key(key)?;
        Ok(match self.route(key) {
            Route::NotReady => Status::NotReady,
            Route::Local => self.store.delete(key).await,
            Route::Remote(owner) => match self.peer(&owner)? {
                Some(mut peer) => settle(&owner, key, peer.delete(key).await),
                None => Status::WrongServer,
            },
        })
    }

    pub async fn append_to_list(&self, key: &str, item: &str) -> Result<Status> {
        validate_key(key)?;
        Ok(match self.route(key) {
            Route::NotReady => Status::NotReady,
            Route::Local => self.store.append_to_list(key, item).await,
            Route::Remote(owner) => match self.peer(&owner)? {
                Some(mut peer) => settle(&owner, key, peer.append_to_list(key, item).await),
                None => Status::WrongServer,
            },
        })
    }

    pub async fn remove_from_list(&self, key: &str, item: &str) -> Result<Status> {
        validate_key(key)?;
        Ok(match self.route(key) {
            Route::NotReady => Status::NotReady,
            Route::Local => self.store.remove_from_list(key, item).await,
            Route::Remote(owner) => match self.peer(&owner)? {
                Some(mut peer) => settle(&owner, key, peer.remove_from_list(key, item).await),
                None => Status::WrongServer,
            },
        })
    }

    fn route(&self, key: &str) -> Route {
        let Some(ring) = self.ring.get() else {
            return Route::NotReady;
        };
        let owner = ring.owner(key);
        if owner.id == self.me.id {
            Route::Local
        } else {
            tracing::debug!("Key {} belongs to {}", key, owner);
            Route::Remote(owner.clone())
        }
    }

    /// Client for the owning peer, or `None` when mis-routed calls are rejected.
    fn peer(&self, owner: &Node) -> Result<Option<RemoteShard>> {
        if self.route_policy == RoutePolicy::Reject {
            return Ok(None);
        }
        let mut peers = self.peers.lock().unwrap();
        if let Some(peer) = peers.get(&owner.id) {
            return Ok(Some(peer.clone()));
        }
        let peer = RemoteShard::connect_lazy(&owner.address, self.connect_timeout)?
            .with_request_timeout(self.request_timeout);
        peers.insert(owner.id, peer.clone());
        Ok(Some(peer))
    }
}

fn forward_failed(owner: &Node, key: &str, e: &crate::Error) {
    tracing::warn!("Forwarding {} to {} failed: {}", key, owner, e);
}

fn settle(owner: &Node, key: &str, result: Result<Status>) -> Status {
    result.unwrap_or_else(|e| {
        forward_failed(owner, key, &e);
        Status::WrongServer
    })
}
