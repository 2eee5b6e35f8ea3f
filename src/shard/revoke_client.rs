//! gRPC delivery of revocation notices to caching clients

use crate::common::{endpoint, Result, Status};
use crate::proto::lease_callback_client::LeaseCallbackClient;
use crate::proto::RevokeLeaseRequest;
use crate::shard::lease::Revoker;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tonic::transport::Channel;

/// Calls `LeaseCallback.RevokeLease` on the client's registered address,
/// keeping one channel per address.
pub struct GrpcRevoker {
    connect_timeout: Duration,
    clients: Mutex<HashMap<String, LeaseCallbackClient<Channel>>>,
}

impl GrpcRevoker {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, addr: &str) -> Result<LeaseCallbackClient<Channel>> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(client) = clients.get(addr) {
            return Ok(client.clone());
        }
        let channel = endpoint(addr, self.connect_timeout)?.connect_lazy();
        let client = LeaseCallbackClient::new(channel);
        clients.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    fn evict(&self, addr: &str) {
        self.clients.lock().unwrap().remove(addr);
    }
}

#[tonic::async_trait]
impl Revoker for GrpcRevoker {
    async fn revoke_lease(&self, client_addr: &str, key: &str) -> Result<()> {
        let mut client = self.client(client_addr)?;
        let request = tonic::Request::new(RevokeLeaseRequest {
            key: key.to_string(),
        });

        let response = match client.revoke_lease(request).await {
            Ok(response) => response.into_inner(),
            Err(e) => {
                self.evict(client_addr);
                return Err(e.into());
            }
        };

        match Status::try_from(response.status)? {
            Status::Ok | Status::KeyNotFound => Ok(()),
            other => Err(crate::Error::RevocationRejected {
                client: client_addr.to_string(),
                reason: other.to_string(),
            }),
        }
    }
}
