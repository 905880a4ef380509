//! Event socket transport layer.
//!
//! This module handles the link between the controller and the pimatic
//! server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Controller     │                              │  pimatic        │
//! │                 │     socket.io / WebSocket    │                 │
//! │  dispatch task  │◄────────────────────────────►│  socket.io      │
//! │  → Socket       │      http(s)://host:port     │  server         │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::open` - Start a socket with an event channel
//! 2. `TransportEvent::Connected` - Namespace joined, emits flow
//! 3. `TransportEvent::Error` - Link lost, transport reconnects on its own
//! 4. `Socket::close` - Stop reconnecting, event channel is dropped
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Transport and socket traits |
//! | `reconnect` | Backoff policy |
//! | `socketio` | socket.io over WebSocket |
//! | `memory` | In-process loopback |

// ============================================================================
// Submodules
// ============================================================================

/// Transport and socket traits.
pub mod socket;

/// Reconnection policy.
pub mod reconnect;

/// socket.io transport over WebSocket.
pub mod socketio;

/// In-process loopback transport.
pub mod memory;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryTransport;
pub use reconnect::ReconnectPolicy;
pub use socket::{EventSink, Socket, Transport, TransportEvent};
pub use socketio::SocketIoTransport;
