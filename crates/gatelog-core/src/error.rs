//! Unified error types for the gatelog core library.
//!
//! [`GatelogError`] covers every failure mode the engine can surface. Module
//! specific errors ([`ConfigError`](crate::config::ConfigError) and
//! [`StoreError`](crate::store::StoreError)) convert into it with `From`.
//!
//! Most of these are *not* fatal. Network failures are retried forever by the
//! supervisor and store failures only fail the scan that triggered them; the
//! classification helpers below let callers tell the two apart.
//!
//! # Example
//!
//! ```rust
//! use gatelog_core::error::{GatelogError, Result};
//!
//! fn require_epc(epc: &str) -> Result<()> {
//!     if epc.trim().is_empty() {
//!         return Err(GatelogError::InvalidIdentifier(epc.to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all gatelog operations.
#[derive(Debug, Error)]
pub enum GatelogError {
    // =========================================================================
    // READER CONNECTION ERRORS
    // =========================================================================
    /// The reader did not accept the connection within the connect timeout.
    #[error("Timed out connecting to reader at {address} after {timeout_secs} seconds")]
    ConnectTimeout {
        /// Reader address that was dialled.
        address: String,
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// The connection attempt failed outright (refused, unreachable, ...).
    #[error("Failed to connect to reader at {address}: {message}")]
    ConnectFailed {
        /// Reader address that was dialled.
        address: String,
        /// Underlying error message.
        message: String,
    },

    /// An established connection was closed by the reader.
    #[error("Reader closed the connection")]
    ConnectionClosed,

    // =========================================================================
    // TRACKING ERRORS
    // =========================================================================
    /// An identifier was empty or otherwise unusable as a lookup key.
    #[error("Invalid tag identifier: '{0}'")]
    InvalidIdentifier(String),

    /// No tracked object is registered under the identifier.
    #[error("No vehicle registered for tag '{0}'")]
    ObjectNotFound(String),

    /// The registration or transit store failed.
    #[error("Store error: {0}")]
    Store(String),

    // =========================================================================
    // ENGINE ERRORS
    // =========================================================================
    /// The engine task has stopped and no longer answers commands.
    #[error("Scan engine is not running")]
    EngineUnavailable,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized [`Result`] type for gatelog operations.
pub type Result<T> = std::result::Result<T, GatelogError>;

impl GatelogError {
    /// Returns `true` if this error came from the reader connection.
    #[inline]
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::ConnectFailed { .. } | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this error came from the registration or transit store.
    #[inline]
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_) | Self::ObjectNotFound(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if the failure clears up on its own (the supervisor
    /// reconnects, the next scan retries the store).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ConnectFailed { .. }
                | Self::ConnectionClosed
                | Self::Store(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_) => 400,

            Self::ObjectNotFound(_) | Self::ConfigNotFound(_) => 404,

            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            Self::Store(_) | Self::IoError(_) | Self::Serialization(_) => 500,

            Self::ConnectTimeout { .. } | Self::ConnectFailed { .. } | Self::ConnectionClosed => {
                502
            }

            Self::EngineUnavailable => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
            Self::ConnectFailed { .. } => "CONNECT_FAILED",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
            Self::EngineUnavailable => "ENGINE_UNAVAILABLE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for GatelogError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::WriteError { path, source } => {
                Self::IoError(std::io::Error::new(
                    source.kind(),
                    format!("Failed to write {}: {source}", path.display()),
                ))
            }
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::store::StoreError> for GatelogError {
    fn from(err: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match err {
            StoreError::VehicleNotFound(epc) => Self::ObjectNotFound(epc),
            StoreError::InvalidEpc(epc) => Self::InvalidIdentifier(epc),
            other => Self::Store(other.to_string()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_network_error_classification() {
        assert!(GatelogError::ConnectionClosed.is_network_error());
        assert!(GatelogError::ConnectTimeout {
            address: "10.10.100.254:49152".into(),
            timeout_secs: 10
        }
        .is_network_error());
        assert!(!GatelogError::Store("down".into()).is_network_error());
    }

    #[test]
    fn test_store_error_classification() {
        assert!(GatelogError::Store("down".into()).is_store_error());
        assert!(GatelogError::ObjectNotFound("e2".into()).is_store_error());
        assert!(!GatelogError::EngineUnavailable.is_store_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(GatelogError::ConnectionClosed.is_recoverable());
        assert!(GatelogError::Store("timeout".into()).is_recoverable());
        assert!(!GatelogError::ConfigValidationError("bad".into()).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            GatelogError::InvalidIdentifier(String::new()).http_status_code(),
            400
        );
        assert_eq!(
            GatelogError::ObjectNotFound("e2".into()).http_status_code(),
            404
        );
        assert_eq!(GatelogError::EngineUnavailable.http_status_code(), 503);
        assert_eq!(GatelogError::ConnectionClosed.http_status_code(), 502);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(GatelogError::ConnectionClosed.error_code(), "CONNECTION_CLOSED");
        assert_eq!(
            GatelogError::ConfigNotFound(PathBuf::new()).error_code(),
            "CONFIG_NOT_FOUND"
        );
    }

    #[test]
    fn test_from_io_error() {
        let err: GatelogError = IoErr::new(ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, GatelogError::IoError(_)));
    }

    #[test]
    fn test_from_store_error() {
        let err: GatelogError = crate::store::StoreError::VehicleNotFound("e2aa".into()).into();
        assert!(matches!(err, GatelogError::ObjectNotFound(ref epc) if epc == "e2aa"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<GatelogError>();
        assert_sync::<GatelogError>();
    }
}
