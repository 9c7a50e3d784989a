//! Error types for modelsync-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use modelsync_crypto::CryptoError;
use modelsync_types::NodeId;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Document or collection not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create-only write hit an existing document
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Document could not be read or written as given
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The store could not be reached
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Cluster membership and node RPC errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Membership layer could not list nodes
    #[error("Membership unavailable: {0}")]
    Membership(String),

    /// Request to a node failed in transport
    #[error("Node {node_id} unreachable: {reason}")]
    Transport { node_id: NodeId, reason: String },

    /// Node did not answer in time
    #[error("Node {node_id} timed out after {timeout_ms}ms")]
    Timeout { node_id: NodeId, timeout_ms: u64 },

    /// Node answered with something the round did not ask for
    #[error("Node {node_id} sent an unexpected response: {detail}")]
    UnexpectedResponse { node_id: NodeId, detail: String },
}

/// Errors that abort a sync-up cycle stage
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The persisted master key document is unusable
    #[error("Master key record invalid: {0}")]
    MasterKeyInvalid(String),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Result type alias for sync-up stages
pub type SyncResult<T> = Result<T, SyncError>;
