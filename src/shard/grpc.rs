//! Shard gRPC service
//!
//! Thin adapter from the generated `Shard` trait onto [`ShardService`].

use crate::proto::shard_server::{Shard, ShardServer};
use crate::proto::*;
use crate::shard::service::ShardService;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ShardGrpcService {
    service: Arc<ShardService>,
}

impl ShardGrpcService {
    pub fn new(service: Arc<ShardService>) -> Self {
        Self { service }
    }

    /// Converts this service into a gRPC server instance.
    pub fn into_server(self) -> ShardServer<Self> {
        ShardServer::new(self)
    }
}

fn status_response(status: crate::common::Status) -> Response<StatusResponse> {
    Response::new(StatusResponse {
        status: status.into(),
    })
}

#[tonic::async_trait]
impl Shard for ShardGrpcService {
    async fn join(
        &self,
        req: Request<JoinRequest>,
    ) -> Result<Response<MembershipResponse>, Status> {
        let node = req
            .into_inner()
            .node
            .ok_or_else(|| Status::invalid_argument("join request carries no node"))?;
        let reply = self.service.join(node.into())?;
        Ok(Response::new((&reply).into()))
    }

    async fn members(
        &self,
        _req: Request<MembersRequest>,
    ) -> Result<Response<MembershipResponse>, Status> {
        let reply = self.service.members();
        Ok(Response::new((&reply).into()))
    }

    async fn get(&self, req: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = req.into_inner();
        let reply = self
            .service
            .get(&req.key, req.want_lease, &req.client_address)
            .await?;
        Ok(Response::new(reply.into()))
    }

    async fn get_list(
        &self,
        req: Request<GetRequest>,
    ) -> Result<Response<GetListResponse>, Status> {
        let req = req.into_inner();
        let reply = self
            .service
            .get_list(&req.key, req.want_lease, &req.client_address)
            .await?;
        Ok(Response::new(reply.into()))
    }

    async fn put(&self, req: Request<PutRequest>) -> Result<Response<StatusResponse>, Status> {
        let req = req.into_inner();
        let status = self.service.put(&req.key, &req.value).await?;
        Ok(status_response(status))
    }

    async fn delete(
        &self,
        req: Request<DeleteRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let req = req.into_inner();
        let status = self.service.delete(&req.key).await?;
        Ok(status_response(status))
    }

    async fn append_to_list(
        &self,
        req: Request<PutRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let req = req.into_inner();
        let status = self.service.append_to_list(&req.key, &req.value).await?;
        Ok(status_response(status))
    }

    async fn remove_from_list(
        &self,
        req: Request<PutRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let req = req.into_inner();
        let status = self.service.remove_from_list(&req.key, &req.value).await?;
        Ok(status_response(status))
    }
}
