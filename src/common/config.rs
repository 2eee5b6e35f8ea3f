//! Configuration for a ringstore shard
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! `RINGSTORE__SECTION__FIELD` environment variables. The binary applies CLI
//! flags on top.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shard: ShardConfig,
    pub lease: LeaseConfig,
    pub bootstrap: BootstrapConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard: ShardConfig::default(),
            lease: LeaseConfig::default(),
            bootstrap: BootstrapConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Assembles and serves the ring membership
    #[default]
    Coordinator,
    /// Joins the ring through the coordinator
    Member,
}

/// What a shard does with a data call for a key it does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePolicy {
    /// Answer `WrongServer` and let the caller retry elsewhere
    #[default]
    Reject,
    /// Proxy the call to the owner
    Forward,
}

/// Shard identity and ring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Ring position of this shard
    pub node_id: u32,

    pub role: NodeRole,

    /// Coordinator `host:port`; members only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator_addr: Option<String>,

    /// Expected ring size, coordinator included
    pub num_nodes: usize,

    /// Bind address for gRPC
    pub bind_addr: SocketAddr,

    /// Address announced to peers; defaults to 127.0.0.1 on the bound port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,

    pub route_policy: RoutePolicy,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            role: NodeRole::Coordinator,
            coordinator_addr: None,
            num_nodes: 1,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            advertise_addr: None,
            route_policy: RoutePolicy::Reject,
        }
    }
}

/// Lease policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Trailing window for counting reads of a key
    pub query_cache_seconds: u64,

    /// Reads within the window needed before a lease is granted
    pub query_cache_thresh: usize,

    /// Lease term reported to clients
    pub lease_seconds: u64,

    /// Extra time the shard keeps honoring a lease past its term
    pub lease_guard_seconds: u64,

    /// Per-client bound on a revocation notice
    pub revoke_timeout_ms: u64,

    /// Revocation notices in flight per mutation
    pub max_concurrent_revocations: usize,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            query_cache_seconds: 10,
            query_cache_thresh: 3,
            lease_seconds: 10,
            lease_guard_seconds: 2,
            revoke_timeout_ms: 2_000,
            max_concurrent_revocations: 16,
        }
    }
}

impl LeaseConfig {
    pub fn query_window(&self) -> Duration {
        Duration::from_secs(self.query_cache_seconds)
    }

    pub fn lease_term(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    /// How long the shard treats a granted lease as live.
    pub fn holder_term(&self) -> Duration {
        Duration::from_secs(self.lease_seconds + self.lease_guard_seconds)
    }

    pub fn revoke_timeout(&self) -> Duration {
        Duration::from_millis(self.revoke_timeout_ms)
    }
}

/// Ring formation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Give up on the ring after this long
    pub startup_timeout_secs: u64,

    pub connect_timeout_ms: u64,

    /// Upper bound on a single call to another shard
    pub request_timeout_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
            startup_timeout_secs: 30,
            connect_timeout_ms: 1_000,
            request_timeout_ms: 2_000,
        }
    }
}

impl BootstrapConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load from an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("RINGSTORE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Reject settings the shard cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error::InvalidConfig;

        let shard = &self.shard;
        if shard.num_nodes == 0 {
            return Err(InvalidConfig("num_nodes must be at least 1".into()));
        }
        match (shard.role, &shard.coordinator_addr) {
            (NodeRole::Member, None) => {
                return Err(InvalidConfig(
                    "member shards need a coordinator_addr".into(),
                ))
            }
            (NodeRole::Member, Some(addr)) if addr.trim().is_empty() => {
                return Err(InvalidConfig("coordinator_addr is empty".into()))
            }
            (NodeRole::Coordinator, Some(_)) => {
                return Err(InvalidConfig(
                    "the coordinator must not set coordinator_addr".into(),
                ))
            }
            (NodeRole::Member, Some(_)) if shard.num_nodes < 2 => {
                return Err(InvalidConfig(
                    "a ring with a member needs num_nodes >= 2".into(),
                ))
            }
            _ => {}
        }

        let lease = &self.lease;
        if lease.lease_seconds == 0 {
            return Err(InvalidConfig("lease_seconds must be positive".into()));
        }
        if lease.revoke_timeout() >= lease.lease_term() {
            return Err(InvalidConfig(format!(
                "revoke_timeout_ms ({}) must be below lease_seconds ({})",
                lease.revoke_timeout_ms, lease.lease_seconds
            )));
        }
        if lease.max_concurrent_revocations == 0 {
            return Err(InvalidConfig(
                "max_concurrent_revocations must be at least 1".into(),
            ));
        }
        if self.bootstrap.request_timeout_ms == 0 {
            return Err(InvalidConfig("request_timeout_ms must be positive".into()));
        }

        Ok(())
    }

    /// Address this shard announces in the ring.
    pub fn advertise_addr(&self, bound: SocketAddr) -> String {
        self.shard
            .advertise_addr
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", bound.port()))
    }
}
