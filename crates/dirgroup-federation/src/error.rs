//! Federation error types.
//!
//! Errors returned by collaborators. The group provider logs them and degrades
//! to empty results; they never cross its public lookup contract.

use thiserror::Error;

/// Errors that can occur in federation collaborators.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection error to external system.
    #[error("Connection error: {0}")]
    Connection(String),

    /// User lookup error.
    #[error("User lookup error: {0}")]
    UserLookup(String),

    /// Group graph lookup error.
    #[error("Group graph error: {0}")]
    Graph(String),

    /// Operation not supported by this provider.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Protocol error (e.g., LDAP protocol error).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout error.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error.
    #[error("Internal federation error: {0}")]
    Internal(String),
}

impl FederationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a user lookup error.
    #[must_use]
    pub fn user_lookup(msg: impl Into<String>) -> Self {
        Self::UserLookup(msg.into())
    }

    /// Creates a group graph error.
    #[must_use]
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Creates a not supported error.
    #[must_use]
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported(operation.into())
    }

    /// Checks if this is a connection error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
