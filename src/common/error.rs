//! Error types for ringstore
//!
//! Protocol outcomes such as `KeyNotFound` or `WrongServer` are not errors;
//! they travel as [`crate::common::Status`] values. This enum covers failures
//! of the process itself: bootstrap, transport, configuration.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Network Errors ===
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // === Bootstrap Errors ===
    #[error("Coordinator unreachable: {0}")]
    CoordinatorUnreachable(String),

    #[error("Ring not ready after {0:?}")]
    BootstrapTimeout(std::time::Duration),

    #[error("Not the coordinator")]
    NotCoordinator,

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Lease Errors ===
    #[error("Revocation rejected by {client}: {reason}")]
    RevocationRejected { client: String, reason: String },

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_)
            | Error::ConnectionFailed(_)
            | Error::CoordinatorUnreachable(_)
            | Error::Transport(_) => true,
            Error::Grpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded
            ),
            _ => false,
        }
    }

    /// Convert to gRPC status for RPC responses
    pub fn to_grpc_status(&self) -> tonic::Status {
        use tonic::Code;
        match self {
            Error::NotCoordinator => tonic::Status::new(Code::FailedPrecondition, self.to_string()),
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => {
                tonic::Status::new(Code::InvalidArgument, self.to_string())
            }
            Error::Timeout(_) | Error::BootstrapTimeout(_) => {
                tonic::Status::new(Code::DeadlineExceeded, self.to_string())
            }
            Error::ConnectionFailed(_) | Error::CoordinatorUnreachable(_) => {
                tonic::Status::new(Code::Unavailable, self.to_string())
            }
            Error::Grpc(status) => status.clone(),
            _ => tonic::Status::new(Code::Internal, self.to_string()),
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(e: Error) -> Self {
        e.to_grpc_status()
    }
}
