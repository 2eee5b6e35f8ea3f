//! # ringstore
//!
//! One shard of a partitioned key/value and key/list store:
//! - Fixed-size ring assembled by a coordinator shard at startup
//! - Consistent-hash routing of keys onto `u32` node ids
//! - Read leases that let caching clients skip the shard, revoked before
//!   any write to the leased key is acknowledged
//! - gRPC for everything, between shards and towards clients
//!
//! ## Architecture
//!
//! ```text
//!              Join / Members (startup)
//!   ┌──────────────┐ ◄──────────────┐
//!   │ Shard 17     │                │
//!   │ (coordinator)│          ┌─────┴──────┐   ┌────────────┐
//!   └──────┬───────┘          │ Shard 9000 │   │ Shard 4e9  │
//!          │                  └─────┬──────┘   └─────┬──────┘
//!          │ Get/Put/...            │                │
//!   ┌──────┴────────────────────────┴────────────────┴──────┐
//!   │        caching clients (LeaseCallback endpoint)        │
//!   └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinator of a three-shard ring
//! ```bash
//! ringstore-shard --id 17 --num-nodes 3 --bind 0.0.0.0:9000
//! ```
//!
//! ### Start the other shards
//! ```bash
//! ringstore-shard --id 9000 --num-nodes 3 --bind 0.0.0.0:9001 --coordinator localhost:9000
//! ringstore-shard --id 4000000000 --num-nodes 3 --bind 0.0.0.0:9002 --coordinator localhost:9000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! ringstore --shard localhost:9000 members
//! ringstore --shard localhost:9001 put alice:status "hello"
//! ringstore --shard localhost:9001 append alice:friends bob
//! ```

pub mod common;
pub mod coordinator;
pub mod shard;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::MembershipCoordinator;
pub use shard::{RunningShard, ShardNode};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("ringstore");
}

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
