use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Invalid client state: {0}")]
    InvalidState(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Invalid capability: {0}")]
    InvalidCapability(String),

    #[error("Slot request failed: {0}")]
    SlotRequest(String),

    #[error("Heartbeat failed: {0}")]
    Heartbeat(String),

    #[error("Unregistration failed: {0}")]
    Unregistration(String),

    #[error("Agent RPC failed for slot {slot_id}: {message}")]
    Agent { slot_id: String, message: String },

    #[error("Invalid response from {0}")]
    InvalidResponse(String),

    #[error("gRPC error: {0}")]
    GrpcError(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
