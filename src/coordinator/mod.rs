//! Ring formation
//!
//! The coordinator shard assembles the membership; member shards join it
//! through [`bootstrap::join_ring`] before serving any data call.

pub mod bootstrap;
pub mod membership;

pub use bootstrap::join_ring;
pub use membership::MembershipCoordinator;
