//! Node status indicator.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::controller::Notification;

// ============================================================================
// NodeStatus
// ============================================================================

/// What a node shows its user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeStatus {
    /// Nothing happened yet.
    #[default]
    Idle,
    /// Last operation or notification was fine.
    Ok,
    /// Last operation failed, or the variable or connection is unusable.
    Error(String),
}

impl NodeStatus {
    /// Creates an error status.
    #[inline]
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }

    /// Returns `true` for [`NodeStatus::Error`].
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Status implied by a connection-level notification, if any.
    #[must_use]
    pub fn from_connection(notification: &Notification) -> Option<Self> {
        match notification {
            Notification::Connected => Some(Self::Ok),
            Notification::ConnectionError(message) => Some(Self::error(message.as_str())),
            Notification::ValueChanged(_) | Notification::NotFound(_) => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => Ok(()),
            Self::Ok => f.write_str("ok"),
            Self::Error(text) => f.write_str(text),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
