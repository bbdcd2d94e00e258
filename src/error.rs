//! Error types for the simulated cluster
//!
//! Provides structured error types for membership, registration, shared
//! primitives and the background execution machinery.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the simulated cluster
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No async runtime available: {0}")]
    Runtime(String),

    // =========================================================================
    // Membership Errors
    // =========================================================================
    #[error("Node has already joined the cluster as {node_id}")]
    AlreadyActive { node_id: String },

    #[error("Node is not an active cluster member")]
    NotActive,

    #[error("Not a member of the cluster: {node_id}")]
    NotAMember { node_id: String },

    #[error("Node already registered: {node_id}")]
    NodeAlreadyRegistered { node_id: String },

    // =========================================================================
    // Registration Errors
    // =========================================================================
    #[error("Registration not found for address {address}")]
    RegistrationNotFound { address: String },

    // =========================================================================
    // Shared Data Errors
    // =========================================================================
    #[error("Timed out after {timeout:?} waiting for lock {name}")]
    LockTimeout { name: String, timeout: Duration },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error was caused by the caller misusing the API
    /// rather than by the cluster itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyActive { .. }
                | Error::NotActive
                | Error::NotAMember { .. }
                | Error::RegistrationNotFound { .. }
                | Error::Configuration(_)
        )
    }

    /// Check if this error is transient (the same call may succeed later)
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::LockTimeout { .. })
    }
}

/// Result type alias for the simulated cluster
pub type Result<T> = std::result::Result<T, Error>;
