//! Core value types shared by the coordinator and the shard, plus their
//! conversions to and from the generated protobuf messages.

use crate::proto;
use serde::{Deserialize, Serialize};

/// One storage shard in the ring. Identity is the `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// `host:port` the shard serves gRPC on
    pub address: String,
    pub id: u32,
}

impl Node {
    pub fn new(address: impl Into<String>, id: u32) -> Self {
        Self {
            address: address.into(),
            id,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Lease decision returned alongside a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub granted: bool,
    pub valid_seconds: i64,
}

impl Lease {
    pub fn denied() -> Self {
        Self::default()
    }

    pub fn granted(valid_seconds: i64) -> Self {
        Self {
            granted: true,
            valid_seconds,
        }
    }
}

/// Outcome of a shard call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    KeyNotFound,
    ItemNotFound,
    WrongServer,
    ItemExists,
    NotReady,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::KeyNotFound => write!(f, "KeyNotFound"),
            Status::ItemNotFound => write!(f, "ItemNotFound"),
            Status::WrongServer => write!(f, "WrongServer"),
            Status::ItemExists => write!(f, "ItemExists"),
            Status::NotReady => write!(f, "NotReady"),
        }
    }
}

/// Membership answer from `Join` / `Members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipReply {
    pub status: Status,
    /// Sorted by id. Empty unless `status` is `Ok`.
    pub members: Vec<Node>,
}

impl MembershipReply {
    pub fn not_ready() -> Self {
        Self {
            status: Status::NotReady,
            members: Vec::new(),
        }
    }

    pub fn ready(members: Vec<Node>) -> Self {
        Self {
            status: Status::Ok,
            members,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Answer to a scalar read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueReply {
    pub status: Status,
    pub value: String,
    pub lease: Lease,
}

impl ValueReply {
    pub fn status(status: Status) -> Self {
        Self {
            status,
            value: String::new(),
            lease: Lease::denied(),
        }
    }
}

/// Answer to a list read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReply {
    pub status: Status,
    pub value: Vec<String>,
    pub lease: Lease,
}

impl ListReply {
    pub fn status(status: Status) -> Self {
        Self {
            status,
            value: Vec::new(),
            lease: Lease::denied(),
        }
    }
}

// === Protobuf conversions ===

impl From<Status> for proto::StatusCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => proto::StatusCode::Ok,
            Status::KeyNotFound => proto::StatusCode::KeyNotFound,
            Status::ItemNotFound => proto::StatusCode::ItemNotFound,
            Status::WrongServer => proto::StatusCode::WrongServer,
            Status::ItemExists => proto::StatusCode::ItemExists,
            Status::NotReady => proto::StatusCode::NotReady,
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        proto::StatusCode::from(status) as i32
    }
}

impl TryFrom<i32> for Status {
    type Error = crate::Error;

    fn try_from(code: i32) -> crate::Result<Self> {
        match proto::StatusCode::try_from(code) {
            Ok(proto::StatusCode::Ok) => Ok(Status::Ok),
            Ok(proto::StatusCode::KeyNotFound) => Ok(Status::KeyNotFound),
            Ok(proto::StatusCode::ItemNotFound) => Ok(Status::ItemNotFound),
            Ok(proto::StatusCode::WrongServer) => Ok(Status::WrongServer),
            Ok(proto::StatusCode::ItemExists) => Ok(Status::ItemExists),
            Ok(proto::StatusCode::NotReady) => Ok(Status::NotReady),
            _ => Err(crate::Error::Internal(format!("unknown status code {}", code))),
        }
    }
}

impl From<&Node> for proto::Node {
    fn from(node: &Node) -> Self {
        proto::Node {
            address: node.address.clone(),
            id: node.id,
        }
    }
}

impl From<proto::Node> for Node {
    fn from(node: proto::Node) -> Self {
        Node {
            address: node.address,
            id: node.id,
        }
    }
}

impl From<Lease> for proto::Lease {
    fn from(lease: Lease) -> Self {
        proto::Lease {
            granted: lease.granted,
            valid_seconds: lease.valid_seconds,
        }
    }
}

impl From<proto::Lease> for Lease {
    fn from(lease: proto::Lease) -> Self {
        Lease {
            granted: lease.granted,
            valid_seconds: lease.valid_seconds,
        }
    }
}

impl From<&MembershipReply> for proto::MembershipResponse {
    fn from(reply: &MembershipReply) -> Self {
        proto::MembershipResponse {
            status: reply.status.into(),
            members: reply.members.iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<proto::MembershipResponse> for MembershipReply {
    type Error = crate::Error;

    fn try_from(resp: proto::MembershipResponse) -> crate::Result<Self> {
        Ok(MembershipReply {
            status: Status::try_from(resp.status)?,
            members: resp.members.into_iter().map(Into::into).collect(),
        })
    }
}

impl From<ValueReply> for proto::GetResponse {
    fn from(reply: ValueReply) -> Self {
        proto::GetResponse {
            status: reply.status.into(),
            value: reply.value,
            lease: Some(reply.lease.into()),
        }
    }
}

impl TryFrom<proto::GetResponse> for ValueReply {
    type Error = crate::Error;

    fn try_from(resp: proto::GetResponse) -> crate::Result<Self> {
        Ok(ValueReply {
            status: Status::try_from(resp.status)?,
            value: resp.value,
            lease: resp.lease.map(Into::into).unwrap_or_default(),
        })
    }
}

impl From<ListReply> for proto::GetListResponse {
    fn from(reply: ListReply) -> Self {
        proto::GetListResponse {
            status: reply.status.into(),
            value: reply.value,
            lease: Some(reply.lease.into()),
        }
    }
}

impl TryFrom<proto::GetListResponse> for ListReply {
    type Error = crate::Error;

    fn try_from(resp: proto::GetListResponse) -> crate::Result<Self> {
        Ok(ListReply {
            status: Status::try_from(resp.status)?,
            value: resp.value,
            lease: resp.lease.map(Into::into).unwrap_or_default(),
        })
    }
}
