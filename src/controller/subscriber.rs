//! Subscriber handles and notifications.
//!
//! A [`Subscriber`] is the sending half of an unbounded channel plus a
//! unique id. The consumer keeps the receiver and hands clones of the
//! handle to the controller. Handles compare equal by id only.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::identifiers::SubscriberId;
use crate::variable::Variable;

// ============================================================================
// Notification
// ============================================================================

/// What a subscriber is told.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The variable has a new known state.
    ValueChanged(Variable),
    /// The variable does not exist on the server.
    NotFound(String),
    /// The connection (re)connected.
    Connected,
    /// The connection failed, e.g. `connection error: ECONNREFUSED`.
    ConnectionError(String),
}

impl Notification {
    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ValueChanged(_) => "value-changed",
            Self::NotFound(_) => "not-found",
            Self::Connected => "connected",
            Self::ConnectionError(_) => "connection-error",
        }
    }
}

// ============================================================================
// Subscriber
// ============================================================================

/// Handle of one local consumer.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Notification>,
}

impl Subscriber {
    /// Creates a handle and the receiver its notifications arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: SubscriberId::next(),
                tx,
            },
            rx,
        )
    }

    /// Returns the handle's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Returns `true` once the receiver was dropped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Delivers a notification. Returns `false` if the receiver is gone.
    pub(crate) fn deliver(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

// ============================================================================
// Tests
// ============================================================================
