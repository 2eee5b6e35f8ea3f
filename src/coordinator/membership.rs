//! Ring membership assembly (coordinator role)
//!
//! The coordinator counts itself as the first member. Peers call `join`
//! until `num_nodes` distinct ids have been seen; at that point the list is
//! sorted by id and frozen for the lifetime of the process.

use crate::common::{MembershipReply, Node, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct JoinState {
    /// Join order, coordinator first
    joined: Vec<Node>,
    /// id -> index into `joined`
    seen: HashMap<u32, usize>,
    frozen: Option<Arc<Vec<Node>>>,
}

/// Accumulates joins and serves the frozen membership.
pub struct MembershipCoordinator {
    num_nodes: usize,
    state: Mutex<JoinState>,
    ready_tx: watch::Sender<Option<Arc<Vec<Node>>>>,
}

impl MembershipCoordinator {
    pub fn new(me: Node, num_nodes: usize) -> Self {
        let (ready_tx, _) = watch::channel(None);
        let coordinator = Self {
            num_nodes,
            state: Mutex::new(JoinState {
                joined: Vec::with_capacity(num_nodes),
                seen: HashMap::with_capacity(num_nodes),
                frozen: None,
            }),
            ready_tx,
        };
        coordinator.join(me);
        coordinator
    }

    /// Register `node`. Repeated calls with a known id are not counted again.
    pub fn join(&self, node: Node) -> MembershipReply {
        let mut state = self.state.lock().unwrap();

        if let Some(frozen) = &state.frozen {
            if !state.seen.contains_key(&node.id) {
                tracing::warn!("Node {} asked to join a sealed ring; ignored", node);
            }
            return MembershipReply::ready(frozen.to_vec());
        }

        if let Some(&idx) = state.seen.get(&node.id) {
            let known = &state.joined[idx];
            if known.address != node.address {
                tracing::warn!(
                    "Node id {} rejoined from {} but is registered at {}",
                    node.id,
                    node.address,
                    known.address
                );
            }
            return MembershipReply::not_ready();
        }

        tracing::info!(
            "Node {} joined ({}/{})",
            node,
            state.joined.len() + 1,
            self.num_nodes
        );
        let idx = state.joined.len();
        state.seen.insert(node.id, idx);
        state.joined.push(node);

        if state.joined.len() < self.num_nodes {
            return MembershipReply::not_ready();
        }

        let mut members = state.joined.clone();
        members.sort_by_key(|n| n.id);
        let members = Arc::new(members);
        state.frozen = Some(members.clone());
        drop(state);

        tracing::info!("Ring sealed with {} members", members.len());
        self.ready_tx.send_replace(Some(members.clone()));
        MembershipReply::ready(members.to_vec())
    }

    /// Current membership status; never mutates.
    pub fn members(&self) -> MembershipReply {
        let state = self.state.lock().unwrap();
        match &state.frozen {
            Some(frozen) => MembershipReply::ready(frozen.to_vec()),
            None => MembershipReply::not_ready(),
        }
    }

    /// Number of distinct nodes registered so far.
    pub fn joined_count(&self) -> usize {
        self.state.lock().unwrap().joined.len()
    }

    /// Nodes in the order they joined.
    pub fn join_order(&self) -> Vec<Node> {
        self.state.lock().unwrap().joined.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().frozen.is_some()
    }

    /// Resolve once the ring is sealed.
    pub async fn wait_ready(&self) -> Result<Vec<Node>> {
        let mut rx = self.ready_tx.subscribe();
        let members = rx
            .wait_for(|members| members.is_some())
            .await
            .map_err(|e| crate::Error::Internal(format!("membership channel closed: {}", e)))?;
        Ok(members
            .as_ref()
            .map(|m| m.to_vec())
            .unwrap_or_default())
    }
}
