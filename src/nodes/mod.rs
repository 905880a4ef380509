//! Flow nodes built on a [`Controller`](crate::Controller).
//!
//! Each node owns one subscription and turns input messages and
//! notifications into output messages. Dropping a node deregisters it;
//! the connection closes with the last one.
//!
//! # Nodes
//!
//! | Node | Subscribes to | Input | Output |
//! |------|---------------|-------|--------|
//! | [`GetVariableNode`] | its variable | read the variable | value on change and/or input |
//! | [`SetVariableNode`] | its variable | write `payload` or the configured value | the written variable |
//! | [`DeviceActionNode`] | `#action` | call a device action | `{payload, success, deviceId, action, time}` |
//! | [`RuleActionNode`] | `#action` | execute a templated rule action | `{payload, success, action, time}` |
//!
//! # Example
//!
//! ```no_run
//! use pimatic_bridge::Controller;
//! use pimatic_bridge::nodes::{GetVariableConfig, GetVariableNode};
//!
//! # async fn example() -> pimatic_bridge::Result<()> {
//! let controller = Controller::builder().host("pimatic.local").build()?;
//! let mut node = GetVariableNode::new(
//!     &controller,
//!     GetVariableConfig { variable: "$temperature".into(), ..Default::default() },
//! )?;
//!
//! while let Some(msg) = node.recv().await {
//!     println!("{}", msg["payload"]);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Device and rule action nodes.
pub mod action;

/// Variable reading node.
pub mod get_variable;

/// Variable writing node.
pub mod set_variable;

/// Node status.
pub mod status;

/// Messages and shared helpers.
pub mod support;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{DeviceActionConfig, DeviceActionNode, RuleActionConfig, RuleActionNode};
pub use get_variable::{GetVariableConfig, GetVariableNode, OutputMode};
pub use set_variable::{SetVariableConfig, SetVariableNode};
pub use status::NodeStatus;
pub use support::{Message, normalize_variable_name, variable_message};
