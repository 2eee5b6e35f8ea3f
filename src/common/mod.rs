//! Common utilities and types shared across ringstore

pub mod config;
pub mod error;
pub mod hash;
pub mod types;
pub mod utils;

pub use self::config::{BootstrapConfig, Config, LeaseConfig, NodeRole, RoutePolicy, ShardConfig};
pub use error::{Error, Result};
pub use hash::{key_hash, routing_prefix};
pub use types::{Lease, ListReply, MembershipReply, Node, Status, ValueReply};
pub use utils::{endpoint, endpoint_uri, validate_key, Backoff};
