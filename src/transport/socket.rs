//! Transport abstraction.
//!
//! The controller never talks to a network library directly. It asks a
//! [`Transport`] to open a [`Socket`] and receives everything the socket
//! observes as [`TransportEvent`]s on a channel, in delivery order.
//!
//! A transport owns reconnection: after an error it keeps retrying with the
//! supplied [`ReconnectPolicy`] until the socket is closed.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

use super::ReconnectPolicy;

// ============================================================================
// Types
// ============================================================================

/// Channel on which a socket reports what it observes.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Something a socket observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket is connected (first time or after a reconnect).
    Connected,
    /// An established connection failed or was lost.
    Error(String),
    /// A connection attempt failed.
    ConnectError(String),
    /// A named event from the server with its first argument.
    Event {
        /// Event name.
        name: String,
        /// Event payload.
        payload: Value,
    },
}

// ============================================================================
// Traits
// ============================================================================

/// Factory for event sockets.
pub trait Transport: Send + Sync {
    /// Starts a socket against `endpoint`.
    ///
    /// Returns immediately; connecting happens in the background and is
    /// reported through `events`. When the socket is closed the transport
    /// drops `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be used by this transport.
    fn open(
        &self,
        endpoint: &Url,
        policy: &ReconnectPolicy,
        events: EventSink,
    ) -> Result<Box<dyn Socket>>;
}

/// A live event socket.
pub trait Socket: Send + Sync {
    /// Sends a named event.
    ///
    /// Nothing is buffered: an event is sent within the current connection
    /// or not at all.
    ///
    /// # Errors
    ///
    /// - [`Error::SocketNotReady`](crate::Error::SocketNotReady) while
    ///   the socket is connecting or reconnecting
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the
    ///   socket was closed
    fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Closes the socket and stops reconnecting. Idempotent.
    fn close(&self);
}
