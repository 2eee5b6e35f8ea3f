//! Joining the ring from a member shard

use crate::common::{Backoff, BootstrapConfig, MembershipReply, Node, Result};
use crate::shard::client::RemoteShard;
use tokio::time::Instant;

/// Call `Join` on the coordinator until the ring is sealed, then return the
/// sorted membership. Gives up after `startup_timeout`.
pub async fn join_ring(coordinator_addr: &str, me: &Node, config: &BootstrapConfig) -> Result<Vec<Node>> {
    let deadline = Instant::now() + config.startup_timeout();
    let mut backoff = Backoff::new(config.initial_backoff(), config.max_backoff());
    let mut client: Option<RemoteShard> = None;
    let mut reached = false;
    let mut attempt = 0u32;

    tracing::info!("Joining ring via coordinator {} as {}", coordinator_addr, me);

    loop {
        attempt += 1;
        // a coordinator that accepts connections but never answers must not
        // hold startup past the deadline
        let limit = config
            .request_timeout()
            .min(deadline.saturating_duration_since(Instant::now()));
        let join = attempt_join(&mut client, coordinator_addr, me, config);
        let result = match tokio::time::timeout(limit, join).await {
            Ok(result) => result,
            Err(_) => Err(crate::Error::Timeout(format!(
                "join via {} took longer than {:?}",
                coordinator_addr, limit
            ))),
        };

        match result {
            Ok(reply) if reply.is_ready() => {
                tracing::info!(
                    "Ring ready with {} members after {} attempt(s)",
                    reply.members.len(),
                    attempt
                );
                return Ok(reply.members);
            }
            Ok(_) => {
                reached = true;
                tracing::debug!("Coordinator not ready (attempt {})", attempt);
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Join attempt {} failed: {}", attempt, e);
                client = None;
            }
            Err(e) => return Err(e),
        }

        let delay = backoff.next_delay();
        if Instant::now() + delay >= deadline {
            return Err(if reached {
                crate::Error::BootstrapTimeout(config.startup_timeout())
            } else {
                crate::Error::CoordinatorUnreachable(coordinator_addr.to_string())
            });
        }
        tokio::time::sleep(delay).await;
    }
}

/// One `Join` call, dialing the coordinator first if there is no live client.
async fn attempt_join(
    client: &mut Option<RemoteShard>,
    coordinator_addr: &str,
    me: &Node,
    config: &BootstrapConfig,
) -> Result<MembershipReply> {
    let c = match client.take() {
        Some(c) => c,
        None => RemoteShard::connect(coordinator_addr, config.connect_timeout()).await?,
    };
    client.insert(c).join(me).await
}
