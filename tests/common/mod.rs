//! Shared helpers for the integration tests

#![allow(dead_code)]

use futures_util::future::try_join_all;
use ringstore::common::{Config, Node, NodeRole, RoutePolicy};
use ringstore::proto::lease_callback_server::{LeaseCallback, LeaseCallbackServer};
use ringstore::proto::{RevokeLeaseRequest, RevokeLeaseResponse};
use ringstore::shard::RemoteShard;
use ringstore::{RunningShard, ShardNode};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

pub fn shard_config(id: u32, num_nodes: usize, coordinator: Option<SocketAddr>) -> Config {
    let mut config = Config::default();
    config.shard.node_id = id;
    config.shard.num_nodes = num_nodes;
    config.shard.bind_addr = "127.0.0.1:0".parse().unwrap();
    if let Some(addr) = coordinator {
        config.shard.role = NodeRole::Member;
        config.shard.coordinator_addr = Some(addr.to_string());
    }
    config.bootstrap.initial_backoff_ms = 20;
    config.bootstrap.max_backoff_ms = 100;
    config.bootstrap.startup_timeout_secs = 10;
    config.bootstrap.connect_timeout_ms = 500;
    config.lease.query_cache_thresh = 1;
    config.lease.revoke_timeout_ms = 500;
    config
}

/// Start a ring whose first id is the coordinator.
pub async fn start_ring(ids: &[u32], policy: RoutePolicy) -> Vec<RunningShard> {
    let mut coord_config = shard_config(ids[0], ids.len(), None);
    coord_config.shard.route_policy = policy;
    let coordinator = ShardNode::bind(coord_config).await.unwrap();
    let coord_addr = coordinator.local_addr();

    let mut nodes = vec![coordinator];
    for &id in &ids[1..] {
        let mut config = shard_config(id, ids.len(), Some(coord_addr));
        config.shard.route_policy = policy;
        nodes.push(ShardNode::bind(config).await.unwrap());
    }

    try_join_all(nodes.into_iter().map(|n| n.start()))
        .await
        .unwrap()
}

pub async fn shutdown_all(shards: Vec<RunningShard>) {
    for shard in shards {
        shard.shutdown().await;
    }
}

pub async fn client(addr: SocketAddr) -> RemoteShard {
    RemoteShard::connect(&addr.to_string(), Duration::from_secs(1))
        .await
        .unwrap()
}

/// Shard in `shards` that owns `key`, and one that does not.
pub fn owner_and_other<'a>(
    shards: &'a [RunningShard],
    key: &str,
) -> (&'a RunningShard, &'a RunningShard) {
    let members = shards[0].members();
    let owner: &Node = ringstore::shard::router::owner(key, &members).unwrap();
    let owning = shards.iter().find(|s| s.node().id == owner.id).unwrap();
    let other = shards.iter().find(|s| s.node().id != owner.id).unwrap();
    (owning, other)
}

/// Caching-client stand-in: records every revocation it receives.
#[derive(Clone, Default)]
pub struct FakeCache {
    pub revoked: Arc<Mutex<Vec<String>>>,
    pub delay: Option<Duration>,
}

#[tonic::async_trait]
impl LeaseCallback for FakeCache {
    async fn revoke_lease(
        &self,
        req: tonic::Request<RevokeLeaseRequest>,
    ) -> Result<tonic::Response<RevokeLeaseResponse>, tonic::Status> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.revoked.lock().unwrap().push(req.into_inner().key);
        Ok(tonic::Response::new(RevokeLeaseResponse {
            status: ringstore::common::Status::Ok.into(),
        }))
    }
}

impl FakeCache {
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    /// Serve the callback endpoint; returns its address.
    pub async fn serve(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = LeaseCallbackServer::new(self.clone());
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        addr
    }
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// An address that accepts connections and never answers on them.
pub async fn silent_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}
