//! Utility functions for ringstore

use rand::Rng;
use std::time::Duration;

/// Longest key accepted by the shard.
pub const MAX_KEY_LEN: usize = 1024;

/// Turn a `host:port` into a URI tonic can dial.
pub fn endpoint_uri(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

/// Build a lazily-connected-on-demand endpoint with a connect timeout.
pub fn endpoint(addr: &str, connect_timeout: Duration) -> crate::Result<tonic::transport::Endpoint> {
    let endpoint = tonic::transport::Endpoint::from_shared(endpoint_uri(addr))
        .map_err(|e| crate::Error::InvalidAddress(format!("{}: {}", addr, e)))?
        .connect_timeout(connect_timeout);
    Ok(endpoint)
}

/// Validate key (must be non-empty, reasonable length)
pub fn validate_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::InvalidArgument("key cannot be empty".into()));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(crate::Error::InvalidArgument(format!(
            "key too long (max {} bytes)",
            MAX_KEY_LEN
        )));
    }

    Ok(())
}

/// Capped exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial,
            max: max.max(initial),
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = (self.next * 2).min(self.max);
        // up to 10% jitter so peers started together do not retry in lockstep
        let jitter_ms = base.as_millis() as u64 / 10;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uri() {
        assert_eq!(endpoint_uri("localhost:9000"), "http://localhost:9000");
        assert_eq!(endpoint_uri("http://localhost:9000"), "http://localhost:9000");
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        assert!(endpoint("not a uri at all", Duration::from_secs(1)).is_err());
        assert!(endpoint("127.0.0.1:9000", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("normal-key").is_ok());
        assert!(validate_key("alice:friends").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_backoff_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(220));
        let _ = backoff.next_delay();
        let capped = backoff.next_delay();
        assert!(capped >= Duration::from_millis(400) && capped <= Duration::from_millis(440));
    }
}
