//! pimatic bridge - shared-connection client for a pimatic home-automation server.
//!
//! This library mirrors pimatic variables locally, fans out their changes to
//! subscribers and invokes remote actions, all over one socket.io
//! connection per server.
//!
//! # Architecture
//!
//! One [`Controller`] owns one endpoint:
//!
//! - **Connection manager**: opens the socket with the first subscription,
//!   closes it with the last
//! - **Variable cache**: latest known state of every remote variable
//! - **Subscription registry**: who is interested in which variable
//! - **Call correlator**: matches `callResult` replies to pending calls by id
//!
//! Key design principles:
//!
//! - All server events are applied by one dispatch task per connection
//! - Events from a replaced connection are discarded by generation number
//! - Subscribers receive [`Notification`]s over their own channel
//! - The transport sits behind a trait; [`MemoryTransport`] drives tests
//!
//! # Quick Start
//!
//! ```no_run
//! use pimatic_bridge::{Controller, Notification, Result, Subscriber};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let controller = Controller::builder()
//!         .host("pimatic.local")
//!         .port(8080)
//!         .credentials("admin", "secret")
//!         .build()?;
//!
//!     let (subscriber, mut notifications) = Subscriber::channel();
//!     controller.register_variable("temperature", &subscriber);
//!
//!     while let Some(notification) = notifications.recv().await {
//!         if let Notification::ValueChanged(variable) = notification {
//!             println!("{} = {}", variable.name, variable.value);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`controller`] | [`Controller`], cache, registry and correlator |
//! | [`nodes`] | Flow nodes: get/set variable, device and rule actions |
//! | [`template`] | `${path}` expansion for rule actions |
//! | [`variable`] | [`Variable`] records |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | pimatic events and socket.io framing (internal) |
//! | [`transport`] | Transport trait, socket.io client, loopback (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager, variable cache, subscription registry, correlator.
///
/// Use [`Controller::builder()`] to create a controller.
pub mod controller;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for calls and subscribers.
pub mod identifiers;

/// Flow nodes.
pub mod nodes;

/// pimatic event and call types, socket.io packet codec.
pub mod protocol;

/// Rule action templates.
pub mod template;

/// Socket transports.
///
/// The controller only talks to the [`Transport`] trait.
pub mod transport;

/// Variable records.
pub mod variable;

// ============================================================================
// Re-exports
// ============================================================================

// Controller types
pub use controller::{
    ACTION_CHANNEL, ConnectionState, Controller, ControllerBuilder, ControllerConfig,
    Notification, Subscriber,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, SubscriberId};

// Protocol types
pub use protocol::Action;

// Transport types
pub use transport::{MemoryTransport, ReconnectPolicy, SocketIoTransport, Transport};

// Variable types
pub use variable::{Variable, VariableType};
