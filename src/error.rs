//! Error types for the pimatic bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use pimatic_bridge::{Controller, Result};
//!
//! async fn example(controller: &Controller) -> Result<()> {
//!     let variable = controller.get_variable_value("temperature").await?;
//!     println!("{} = {}", variable.name, variable.value);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::SocketNotReady`] |
//! | Remote calls | [`Error::CallFailed`], [`Error::Protocol`] |
//! | Variables | [`Error::VariableNotFound`], [`Error::ReadOnlyVariable`] |
//! | Templates | [`Error::UnresolvedReference`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::Action;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when controller or node configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport-level connectivity failure.
    ///
    /// Carries the human-readable message broadcast to subscribers,
    /// e.g. `connection error: ECONNREFUSED`.
    #[error("{message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The connection was torn down before the call settled.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No connection exists for the controller.
    ///
    /// Returned synchronously by remote calls issued before any
    /// subscriber started the connection, or after the controller closed.
    #[error("socket not ready")]
    SocketNotReady,

    // ========================================================================
    // Remote Call Errors
    // ========================================================================
    /// The server answered a call with `success: false`.
    #[error("{action} failed: {message}")]
    CallFailed {
        /// The remote action that failed.
        action: Action,
        /// Error reported by the server.
        message: String,
    },

    /// Protocol violation or unexpected payload shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Variable Errors
    // ========================================================================
    /// Variable is not known to the controller.
    #[error("variable not found: {name}")]
    VariableNotFound {
        /// Name of the missing variable.
        name: String,
    },

    /// Variable cannot be written.
    #[error("variable is readonly: {name}")]
    ReadOnlyVariable {
        /// Name of the readonly variable.
        name: String,
    },

    // ========================================================================
    // Template Errors
    // ========================================================================
    /// A `${...}` reference could not be resolved against the input.
    #[error("variable \"{path}\" is not defined")]
    UnresolvedReference {
        /// Dotted path of the missing reference.
        path: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a failed call error.
    #[inline]
    pub fn call_failed(action: Action, message: impl Into<String>) -> Self {
        Self::CallFailed {
            action,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a variable not found error.
    #[inline]
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound { name: name.into() }
    }

    /// Creates a readonly variable error.
    #[inline]
    pub fn read_only_variable(name: impl Into<String>) -> Self {
        Self::ReadOnlyVariable { name: name.into() }
    }

    /// Creates an unresolved template reference error.
    #[inline]
    pub fn unresolved_reference(path: impl Into<String>) -> Self {
        Self::UnresolvedReference { path: path.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::SocketNotReady
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the server rejected the call.
    #[inline]
    #[must_use]
    pub fn is_call_failure(&self) -> bool {
        matches!(self, Self::CallFailed { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the caller re-invokes after
    /// the transport reconnected.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::SocketNotReady
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_not_ready_display() {
        assert_eq!(Error::SocketNotReady.to_string(), "socket not ready");
    }

    #[test]
    fn test_call_failed_display() {
        let err = Error::call_failed(Action::GetVariableByName, "no such variable");
        assert_eq!(err.to_string(), "getVariableByName failed: no such variable");
        assert!(err.is_call_failure());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_unresolved_reference_names_path() {
        let err = Error::unresolved_reference("room.light");
        assert!(err.to_string().contains("room.light"));
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("connection error: refused").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::SocketNotReady.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::SocketNotReady.is_recoverable());
        assert!(!Error::read_only_variable("x").is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
