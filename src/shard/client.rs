//! Typed client for a remote shard

use crate::common::{endpoint, ListReply, MembershipReply, Node, Result, Status, ValueReply};
use crate::proto::shard_client::ShardClient;
use crate::proto::{DeleteRequest, GetRequest, JoinRequest, MembersRequest, PutRequest};
use std::future::Future;
use std::time::Duration;
use tonic::transport::Channel;

#[derive(Clone)]
pub struct RemoteShard {
    addr: String,
    client: ShardClient<Channel>,
    request_timeout: Option<Duration>,
}

impl RemoteShard {
    /// Dial `addr` now; fails if nothing is listening.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = endpoint(addr, connect_timeout)?
            .connect()
            .await
            .map_err(|e| crate::Error::ConnectionFailed(format!("{}: {}", addr, e)))?;
        Ok(Self {
            addr: addr.to_string(),
            client: ShardClient::new(channel),
            request_timeout: None,
        })
    }

    /// Dial on first use.
    pub fn connect_lazy(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = endpoint(addr, connect_timeout)?.connect_lazy();
        Ok(Self {
            addr: addr.to_string(),
            client: ShardClient::new(channel),
            request_timeout: None,
        })
    }

    /// Fail every call that takes longer than `timeout` with `Error::Timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn join(&mut self, node: &Node) -> Result<MembershipReply> {
        let request = tonic::Request::new(JoinRequest {
            node: Some(node.into()),
        });
        let call = self.client.join(request);
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        response.into_inner().try_into()
    }

    pub async fn members(&mut self) -> Result<MembershipReply> {
        let call = self.client.members(MembersRequest {});
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        response.into_inner().try_into()
    }

    pub async fn get(&mut self, key: &str, want_lease: bool, client_addr: &str) -> Result<ValueReply> {
        let request = tonic::Request::new(GetRequest {
            key: key.to_string(),
            want_lease,
            client_address: client_addr.to_string(),
        });
        let call = self.client.get(request);
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        response.into_inner().try_into()
    }

    pub async fn get_list(
        &mut self,
        key: &str,
        want_lease: bool,
        client_addr: &str,
    ) -> Result<ListReply> {
        let request = tonic::Request::new(GetRequest {
            key: key.to_string(),
            want_lease,
            client_address: client_addr.to_string(),
        });
        let call = self.client.get_list(request);
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        response.into_inner().try_into()
    }

    pub async fn put(&mut self, key: &str, value: &str) -> Result<Status> {
        let call = self.client.put(put_request(key, value));
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        Status::try_from(response.into_inner().status)
    }

    pub async fn delete(&mut self, key: &str) -> Result<Status> {
        let request = tonic::Request::new(DeleteRequest {
            key: key.to_string(),
        });
        let call = self.client.delete(request);
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        Status::try_from(response.into_inner().status)
    }

    pub async fn append_to_list(&mut self, key: &str, item: &str) -> Result<Status> {
        let call = self.client.append_to_list(put_request(key, item));
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        Status::try_from(response.into_inner().status)
    }

    pub async fn remove_from_list(&mut self, key: &str, item: &str) -> Result<Status> {
        let call = self.client.remove_from_list(put_request(key, item));
        let response = bounded(&self.addr, self.request_timeout, call).await?;
        Status::try_from(response.into_inner().status)
    }
}

async fn bounded<T>(
    addr: &str,
    limit: Option<Duration>,
    call: impl Future<Output = std::result::Result<T, tonic::Status>>,
) -> Result<T> {
    let Some(limit) = limit else {
        return Ok(call.await?);
    };
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(crate::Error::Timeout(format!("{} did not answer within {:?}", addr, limit))),
    }
}

fn put_request(key: &str, value: &str) -> tonic::Request<PutRequest> {
    tonic::Request::new(PutRequest {
        key: key.to_string(),
        value: value.to_string(),
    })
}
