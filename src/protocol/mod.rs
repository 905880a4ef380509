//! pimatic wire protocol.
//!
//! This module defines the messages exchanged with the pimatic server
//! and the socket.io framing they travel in.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Call`] | Local → Remote | Remote procedure call |
//! | [`CallResult`] | Remote → Local | Reply, correlated by `id` |
//! | [`Inbound`] | Remote → Local | Variable pushes and snapshots |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `call` | Call, reply and parameter types |
//! | `event` | Inbound event decoding |
//! | `packet` | engine.io / socket.io packet codec |

// ============================================================================
// Submodules
// ============================================================================

/// Remote call messages.
pub mod call;

/// Inbound server events.
pub mod event;

/// socket.io text packet codec.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use call::{
    Action, Call, CallResult, ExecuteActionParams, GetVariableParams, UNKNOWN_CALL_ERROR,
    UpdateVariableParams, device_action_params,
};
pub use event::{Inbound, RemoteVariable, describe_error};
pub use packet::{EnginePacket, Handshake, SocketPacket};
