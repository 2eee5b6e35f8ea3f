//! Storage shard
//!
//! A shard serves the keys the ring assigns to it:
//! - Routing of every data call against the sealed membership
//! - Scalar and list key spaces
//! - Read leases for caching clients, revoked before any conflicting write

pub mod client;
pub mod grpc;
pub mod lease;
pub mod revoke_client;
pub mod router;
pub mod server;
pub mod service;
pub mod store;

pub use client::RemoteShard;
pub use lease::{LeaseManager, RevocationOutcome, Revoker, WriteGuard};
pub use router::Ring;
pub use server::{RunningShard, ShardNode};
pub use service::{Phase, ShardService};
pub use store::DataStore;
