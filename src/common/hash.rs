//! Hashing utilities for ringstore
//!
//! Keys are placed on the ring by a 32-bit BLAKE3-derived hash of their
//! routing prefix, so that the key space lines up with `u32` node ids.

/// Separator between a key's routing prefix and the rest of the key.
pub const ROUTING_SEPARATOR: char = ':';

/// The part of `key` that decides placement.
///
/// `"alice:friends"` and `"alice:posts"` share the prefix `"alice"` and
/// therefore land on the same shard. A key without a separator routes on
/// the whole key.
pub fn routing_prefix(key: &str) -> &str {
    key.split(ROUTING_SEPARATOR).next().unwrap_or(key)
}

/// Hash a key onto the 32-bit ring.
pub fn key_hash(key: &str) -> u32 {
    let hash = blake3::hash(routing_prefix(key).as_bytes());
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
