//! LDAP-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not leak bind credentials.

use dirgroup_federation::FederationError;
use thiserror::Error;

/// LDAP-specific errors.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Invalid configuration.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Connection URL uses an unknown scheme.
    #[error("Unsupported LDAP URL scheme in '{0}': expected ldap://, ldaps:// or ldapi://")]
    UnsupportedScheme(String),

    /// Connection failed.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// Bind (authentication) failed.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// Search completed with a non-success result code.
    #[error("LDAP search failed with result code {rc}: {message}")]
    Search {
        /// LDAP result code.
        rc: u32,
        /// Diagnostic message returned by the server.
        message: String,
    },

    /// A single-entry lookup came back degraded, so neither a match nor
    /// absence is confirmed.
    #[error("LDAP lookup returned an incomplete result ({0:?})")]
    Incomplete(FailureClass),

    /// Timeout error.
    #[error("LDAP operation timed out")]
    Timeout,

    /// Connection gate was shut down.
    #[error("Connection pool closed")]
    PoolClosed,

    /// Operation not supported by this provider.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Protocol error from LDAP server.
    #[error("LDAP protocol error: {0}")]
    Protocol(String),

    /// Internal error.
    #[error("Internal LDAP error: {0}")]
    Internal(String),

    /// Underlying ldap3 error.
    #[error("LDAP error: {0}")]
    Ldap3(#[from] ldap3::LdapError),
}

impl LdapError {
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

    /// Creates a search error from a result code.
    #[must_use]
    pub fn search(rc: u32, message: impl Into<String>) -> Self {
        Self::Search {
            rc,
            message: message.into(),
        }
    }

    /// Creates a not-supported error.
    #[must_use]
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported(operation.into())
    }

    /// Checks if this is a connection-related error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::PoolClosed | Self::Ldap3(_)
        )
    }

    /// Classifies the error for degradation handling.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Search { rc, .. } => FailureClass::from_result_code(*rc),
            Self::Incomplete(class) => *class,
            Self::Connection(_) | Self::Timeout | Self::PoolClosed | Self::Ldap3(_) => {
                FailureClass::Transient
            }
            Self::Configuration(_)
            | Self::UnsupportedScheme(_)
            | Self::Bind(_)
            | Self::NotSupported(_)
            | Self::Protocol(_)
            | Self::Internal(_) => FailureClass::Fatal,
        }
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

// ============================================================================
// Failure Classification
// ============================================================================

/// How a failed or degraded directory round-trip is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The directory could not be reached or refused to proceed. The attempt
    /// yields an empty result and is not retried.
    Transient,
    /// The server-enforced size limit truncated the result set.
    SizeLimited,
    /// Only part of the result set was available (referrals).
    PartialResult,
    /// Anything else.
    Fatal,
}

impl FailureClass {
    /// LDAP result code: timeLimitExceeded.
    pub const TIME_LIMIT_EXCEEDED: u32 = 3;
    /// LDAP result code: sizeLimitExceeded.
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    /// LDAPv2 result code: partialResults.
    pub const PARTIAL_RESULTS: u32 = 9;
    /// LDAP result code: referral.
    pub const REFERRAL: u32 = 10;
    /// LDAP result code: busy.
    pub const BUSY: u32 = 51;
    /// LDAP result code: unavailable.
    pub const UNAVAILABLE: u32 = 52;

    /// Maps an LDAP result code.
    #[must_use]
    pub const fn from_result_code(rc: u32) -> Self {
        match rc {
            Self::TIME_LIMIT_EXCEEDED | Self::BUSY | Self::UNAVAILABLE => Self::Transient,
            Self::SIZE_LIMIT_EXCEEDED => Self::SizeLimited,
            Self::PARTIAL_RESULTS | Self::REFERRAL => Self::PartialResult,
            _ => Self::Fatal,
        }
    }

    /// Whether entries received alongside this failure are still usable.
    #[must_use]
    pub const fn keeps_entries(&self) -> bool {
        matches!(self, Self::SizeLimited | Self::PartialResult)
    }
}

impl From<LdapError> for FederationError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Configuration(msg) => FederationError::Configuration(msg),
            LdapError::UnsupportedScheme(_) => FederationError::Configuration(err.to_string()),
            LdapError::Connection(msg) => FederationError::Connection(msg),
            LdapError::Bind(msg) => FederationError::Connection(format!("bind failed: {msg}")),
            LdapError::Search { .. } | LdapError::Incomplete(_) => {
                FederationError::Protocol(err.to_string())
            }
            LdapError::Timeout => FederationError::Timeout("LDAP operation".to_string()),
            LdapError::PoolClosed => {
                FederationError::Connection("Connection pool closed".to_string())
            }
            LdapError::NotSupported(op) => FederationError::NotSupported(op),
            LdapError::Protocol(msg) => FederationError::Protocol(msg),
            LdapError::Internal(msg) => FederationError::Internal(msg),
            LdapError::Ldap3(e) => FederationError::Connection(e.to_string()),
        }
    }
}
