//! Shard server lifecycle
//!
//! `bind` claims the listening socket, `start` brings up gRPC, forms or joins
//! the ring, and only then flips the shard to `Serving`. Until that point
//! data calls answer `NotReady`.

use crate::common::{Config, Node, NodeRole, Result};
use crate::coordinator::{join_ring, MembershipCoordinator};
use crate::shard::grpc::ShardGrpcService;
use crate::shard::lease::LeaseManager;
use crate::shard::revoke_client::GrpcRevoker;
use crate::shard::router::Ring;
use crate::shard::service::ShardService;
use crate::shard::store::DataStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;

pub struct ShardNode {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ShardNode {
    /// Validate the configuration and bind the listening socket.
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.shard.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            config,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address this shard announces in the ring.
    pub fn advertise_addr(&self) -> String {
        self.config.advertise_addr(self.local_addr)
    }

    /// Serve gRPC, form the ring, and return once the shard is serving.
    pub async fn start(self) -> Result<RunningShard> {
        let shard = &self.config.shard;
        let me = Node::new(self.advertise_addr(), shard.node_id);

        tracing::info!("Starting shard: {}", me);
        tracing::info!("  Role: {:?}", shard.role);
        tracing::info!("  gRPC API: {}", self.local_addr);
        tracing::info!("  Ring size: {}", shard.num_nodes);
        tracing::info!("  Route policy: {:?}", shard.route_policy);

        let coordinator = match shard.role {
            NodeRole::Coordinator => Some(Arc::new(MembershipCoordinator::new(
                me.clone(),
                shard.num_nodes,
            ))),
            NodeRole::Member => None,
        };

        let revoker = Arc::new(GrpcRevoker::new(self.config.bootstrap.connect_timeout()));
        let leases = LeaseManager::new(self.config.lease.clone(), revoker);
        let service = Arc::new(ShardService::new(
            me.clone(),
            shard.route_policy,
            coordinator.clone(),
            DataStore::new(leases),
            self.config.bootstrap.connect_timeout(),
            self.config.bootstrap.request_timeout(),
        ));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let grpc_server = tonic::transport::Server::builder()
            .add_service(ShardGrpcService::new(service.clone()).into_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(self.listener), async move {
                let _ = shutdown_rx.await;
            });
        let server = tokio::spawn(async move {
            if let Err(e) = grpc_server.await {
                tracing::error!("gRPC server error: {}", e);
            }
        });

        let members = match (&coordinator, &shard.coordinator_addr) {
            (Some(coordinator), _) => {
                tracing::info!("Waiting for {} shard(s) to join", shard.num_nodes - 1);
                coordinator.wait_ready().await
            }
            (None, Some(coordinator_addr)) => {
                join_ring(coordinator_addr, &me, &self.config.bootstrap).await
            }
            (None, None) => Err(crate::Error::InvalidConfig(
                "member shards need a coordinator_addr".into(),
            )),
        };

        let ring = match members.and_then(Ring::new) {
            Ok(ring) => ring,
            Err(e) => {
                tracing::error!("Bootstrap failed: {}", e);
                let _ = shutdown_tx.send(());
                let _ = server.await;
                return Err(e);
            }
        };
        service.start_serving(ring)?;

        let sweeper = {
            let service = service.clone();
            let period = self.config.lease.query_window().max(std::time::Duration::from_secs(1));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    let tracked = service.store().leases().sweep();
                    tracing::debug!("Lease sweep: {} key(s) tracked", tracked);
                }
            })
        };

        tracing::info!("✓ Shard ready");

        Ok(RunningShard {
            local_addr: self.local_addr,
            service,
            server,
            sweeper,
            shutdown_tx,
        })
    }

    /// Start and run until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let running = self.start().await?;
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        running.shutdown().await;
        Ok(())
    }
}

/// A shard in the `Serving` phase.
pub struct RunningShard {
    local_addr: SocketAddr,
    service: Arc<ShardService>,
    server: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl RunningShard {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> &Node {
        self.service.node()
    }

    pub fn service(&self) -> &Arc<ShardService> {
        &self.service
    }

    pub fn members(&self) -> Vec<Node> {
        self.service
            .ring()
            .map(|ring| ring.members().to_vec())
            .unwrap_or_default()
    }

    pub async fn shutdown(self) {
        self.sweeper.abort();
        let _ = self.shutdown_tx.send(());
        let _ = self.server.await;
    }
}
