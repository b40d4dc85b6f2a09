//! Cloud plumbing error types

use thiserror::Error;

/// Errors raised while synthesizing, materializing or tracking a stack
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Unresolved attribute {attribute} on {logical_id}")]
    UnresolvedAttribute {
        logical_id: String,
        attribute: String,
    },

    #[error("Provisioning failed: {0}")]
    ProvisioningFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
