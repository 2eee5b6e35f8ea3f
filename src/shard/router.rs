//! Key routing over the sealed ring
//!
//! A key belongs to the first member whose id is >= the key's hash, wrapping
//! around to the lowest id. Every shard applies the same rule to the same
//! sorted membership, so ownership needs no per-request coordination.

use crate::common::{key_hash, Node, Result};
use std::sync::Arc;

/// Owner of `key` among `members` (sorted by id). `None` only for an empty ring.
pub fn owner<'a>(key: &str, members: &'a [Node]) -> Option<&'a Node> {
    let hash = key_hash(key);
    let idx = members.partition_point(|node| node.id < hash);
    members.get(idx).or_else(|| members.first())
}

pub fn is_owner(key: &str, members: &[Node], me: u32) -> bool {
    owner(key, members).is_some_and(|node| node.id == me)
}

/// Immutable, sorted, non-empty membership snapshot.
#[derive(Debug, Clone)]
pub struct Ring {
    members: Arc<[Node]>,
}

impl Ring {
    pub fn new(mut members: Vec<Node>) -> Result<Self> {
        members.sort_by_key(|n| n.id);
        members.dedup_by_key(|n| n.id);
        if members.is_empty() {
            return Err(crate::Error::InvalidConfig("ring has no members".into()));
        }
        Ok(Self {
            members: members.into(),
        })
    }

    pub fn owner(&self, key: &str) -> &Node {
        // non-empty by construction
        owner(key, &self.members).unwrap_or(&self.members[0])
    }

    pub fn is_owner(&self, key: &str, me: u32) -> bool {
        self.owner(key).id == me
    }

    pub fn members(&self) -> &[Node] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
