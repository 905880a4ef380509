//! In-process loopback transport.
//!
//! [`MemoryTransport`] stands in for a pimatic server: it records every
//! emit and lets the caller inject connection signals and server events.
//! Clones share state, so keep one clone and hand another to the
//! controller.
//!
//! # Example
//!
//! ```no_run
//! use pimatic_bridge::transport::MemoryTransport;
//! use serde_json::json;
//!
//! let transport = MemoryTransport::new();
//! // ... build a controller with `transport.clone()` and subscribe ...
//! transport.connect();
//! transport.inject("variableValueChanged", json!({"variableName": "temp", "variableValue": 21}));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};

use super::{EventSink, ReconnectPolicy, Socket, Transport, TransportEvent};

// ============================================================================
// Types
// ============================================================================

/// An event emitted by the client.
pub type Emitted = (String, Value);

/// Shared loopback state.
#[derive(Default)]
struct LoopbackState {
    /// Number of sockets opened.
    opened: usize,
    /// Number of sockets closed.
    closed: usize,
    /// Sequence number of the live socket.
    live: Option<usize>,
    /// Event channel of the live socket.
    sink: Option<EventSink>,
    /// Endpoint of the most recent open.
    endpoint: Option<Url>,
    /// Policy of the most recent open.
    policy: Option<ReconnectPolicy>,
    /// Everything emitted, in order.
    emitted: Vec<Emitted>,
    /// Index of the next emit handed out by `next_emitted`.
    cursor: usize,
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Loopback transport for tests, benchmarks and demos.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<LoopbackState>>,
    emitted: Arc<Notify>,
}

impl MemoryTransport {
    /// Creates a loopback with no open socket.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Server Side
    // ========================================================================

    /// Delivers an event to the live socket. Returns `false` if none is open.
    pub fn send(&self, event: TransportEvent) -> bool {
        let state = self.state.lock();
        match state.sink.as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Signals that the socket connected.
    pub fn connect(&self) -> bool {
        self.send(TransportEvent::Connected)
    }

    /// Signals a transport error on an established connection.
    pub fn fail(&self, reason: &str) -> bool {
        self.send(TransportEvent::Error(reason.to_string()))
    }

    /// Signals a failed connection attempt.
    pub fn fail_connect(&self, reason: &str) -> bool {
        self.send(TransportEvent::ConnectError(reason.to_string()))
    }

    /// Delivers a named server event.
    pub fn inject(&self, name: &str, payload: Value) -> bool {
        self.send(TransportEvent::Event {
            name: name.to_string(),
            payload,
        })
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Returns `true` while a socket is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().live.is_some()
    }

    /// Number of sockets opened so far.
    #[inline]
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().opened
    }

    /// Number of sockets closed so far.
    #[inline]
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.lock().closed
    }

    /// Endpoint passed to the most recent open.
    #[must_use]
    pub fn last_endpoint(&self) -> Option<Url> {
        self.state.lock().endpoint.clone()
    }

    /// Policy passed to the most recent open.
    #[must_use]
    pub fn last_policy(&self) -> Option<ReconnectPolicy> {
        self.state.lock().policy
    }

    /// All events emitted so far.
    #[must_use]
    pub fn emitted(&self) -> Vec<Emitted> {
        self.state.lock().emitted.clone()
    }

    /// Waits for the next emit not yet returned by this method.
    pub async fn next_emitted(&self) -> Emitted {
        loop {
            let notified = self.emitted.notified();
            {
                let mut state = self.state.lock();
                if let Some(item) = state.emitted.get(state.cursor).cloned() {
                    state.cursor += 1;
                    return item;
                }
            }
            notified.await;
        }
    }
}

impl Transport for MemoryTransport {
    fn open(
        &self,
        endpoint: &Url,
        policy: &ReconnectPolicy,
        events: EventSink,
    ) -> Result<Box<dyn Socket>> {
        let mut state = self.state.lock();
        state.opened += 1;
        let sequence = state.opened;
        state.live = Some(sequence);
        state.sink = Some(events);
        state.endpoint = Some(endpoint.clone());
        state.policy = Some(*policy);
        trace!(sequence, %endpoint, "Loopback socket opened");

        Ok(Box::new(MemorySocket {
            sequence,
            state: Arc::clone(&self.state),
            emitted: Arc::clone(&self.emitted),
        }))
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTransport")
            .field("opened", &state.opened)
            .field("closed", &state.closed)
            .field("live", &state.live)
            .field("emitted", &state.emitted.len())
            .finish()
    }
}

// ============================================================================
// MemorySocket
// ============================================================================

/// Socket handed out by [`MemoryTransport`].
struct MemorySocket {
    sequence: usize,
    state: Arc<Mutex<LoopbackState>>,
    emitted: Arc<Notify>,
}

impl Socket for MemorySocket {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.live != Some(self.sequence) {
                return Err(Error::ConnectionClosed);
            }
            state.emitted.push((event.to_string(), payload));
        }
        self.emitted.notify_one();
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.live == Some(self.sequence) {
            state.live = None;
            state.sink = None;
            state.closed += 1;
            trace!(sequence = self.sequence, "Loopback socket closed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::mpsc;

    fn endpoint() -> Url {
        Url::parse("http://localhost:8080").expect("valid url")
    }

    #[tokio::test]
    async fn test_open_forwards_events() {
        let transport = MemoryTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _socket = transport
            .open(&endpoint(), &ReconnectPolicy::default(), tx)
            .expect("open");

        assert!(transport.connect());
        assert!(transport.inject("variables", json!([])));
        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Event { ref name, .. }) if name == "variables"
        ));
    }

    #[tokio::test]
    async fn test_emit_is_recorded() {
        let transport = MemoryTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let socket = transport
            .open(&endpoint(), &ReconnectPolicy::default(), tx)
            .expect("open");

        socket.emit("call", json!({"id": 1})).expect("emit");
        assert_eq!(
            transport.next_emitted().await,
            ("call".to_string(), json!({"id": 1}))
        );
        assert_eq!(transport.emitted().len(), 1);
    }

    #[tokio::test]
    async fn test_close_drops_sink() {
        let transport = MemoryTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = transport
            .open(&endpoint(), &ReconnectPolicy::default(), tx)
            .expect("open");

        socket.close();
        socket.close();
        assert!(!transport.is_open());
        assert_eq!(transport.close_count(), 1);
        assert!(!transport.connect());
        assert_eq!(rx.recv().await, None);
        assert!(socket.emit("call", json!({})).is_err());
    }

    #[test]
    fn test_stale_socket_close_keeps_new_one() {
        let transport = MemoryTransport::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::default();

        let first = transport.open(&endpoint(), &policy, tx1).expect("open");
        let _second = transport.open(&endpoint(), &policy, tx2).expect("open");
        first.close();

        assert!(transport.is_open());
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.close_count(), 0);
    }
}
