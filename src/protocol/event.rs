//! Inbound server events.
//!
//! pimatic pushes named socket.io events. Every event the controller reacts
//! to is decoded into one [`Inbound`] variant; everything else is ignored.
//!
//! # Event Types
//!
//! | Event | Payload | Variant |
//! |-------|---------|---------|
//! | `variables` | `[variable, ...]` | [`Inbound::FullSync`] |
//! | `variableAdded`, `variableChanged` | `variable` | [`Inbound::Push`] |
//! | `variableRemoved` | `{name}` | [`Inbound::Remove`] |
//! | `variableValueChanged` | `{variableName, variableValue}` | [`Inbound::MinimalPush`] |
//! | `callResult` | `{id, success, result?, error?}` | [`Inbound::CallResult`] |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::variable::VariableType;

use super::CallResult;

// ============================================================================
// Event Names
// ============================================================================

/// Outbound remote call.
pub const CALL: &str = "call";
/// Reply to a remote call.
pub const CALL_RESULT: &str = "callResult";
/// Full variable snapshot.
pub const VARIABLES: &str = "variables";
/// A variable was created.
pub const VARIABLE_ADDED: &str = "variableAdded";
/// A variable definition changed.
pub const VARIABLE_CHANGED: &str = "variableChanged";
/// A variable was deleted.
pub const VARIABLE_REMOVED: &str = "variableRemoved";
/// A variable value changed.
pub const VARIABLE_VALUE_CHANGED: &str = "variableValueChanged";

// ============================================================================
// RemoteVariable
// ============================================================================

/// Variable record as sent by the server.
///
/// Every field but the name may be missing or null on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteVariable {
    /// Variable name.
    pub name: String,

    /// Variable kind.
    #[serde(rename = "type", default)]
    pub variable_type: Option<VariableType>,

    /// Current value.
    #[serde(default)]
    pub value: Value,

    /// Display unit.
    #[serde(default)]
    pub unit: Option<String>,

    /// Whether writes are refused.
    #[serde(default)]
    pub readonly: Option<bool>,
}

/// Payload of `variableValueChanged`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueChanged {
    variable_name: String,
    #[serde(default)]
    variable_value: Value,
}

/// Payload of `variableRemoved`. Only the name matters.
#[derive(Debug, Deserialize)]
struct Removed {
    name: String,
}

// ============================================================================
// Inbound
// ============================================================================

/// Everything the controller reacts to, transport signals included.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// The transport (re)connected.
    Connected,

    /// The transport reported an error. Holds the full message, e.g.
    /// `connection error: ECONNREFUSED`.
    ConnectionError(String),

    /// Complete variable list.
    FullSync(Vec<RemoteVariable>),

    /// Full record of an added or changed variable.
    Push(RemoteVariable),

    /// Variable deleted on the server.
    Remove {
        /// Variable name.
        name: String,
    },

    /// Value-only update.
    MinimalPush {
        /// Variable name.
        name: String,
        /// New value.
        value: Value,
    },

    /// Reply to a remote call.
    CallResult(CallResult),
}

impl Inbound {
    /// Decodes a named server event.
    ///
    /// Returns `Ok(None)` for events the controller does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if a handled event carries
    /// a malformed payload.
    pub fn decode(event: &str, payload: Value) -> Result<Option<Self>> {
        let inbound = match event {
            VARIABLES => Self::FullSync(serde_json::from_value(payload)?),
            VARIABLE_ADDED | VARIABLE_CHANGED => Self::Push(serde_json::from_value(payload)?),
            VARIABLE_REMOVED => {
                let removed: Removed = serde_json::from_value(payload)?;
                Self::Remove { name: removed.name }
            }
            VARIABLE_VALUE_CHANGED => {
                let changed: ValueChanged = serde_json::from_value(payload)?;
                Self::MinimalPush {
                    name: changed.variable_name,
                    value: changed.variable_value,
                }
            }
            CALL_RESULT => Self::CallResult(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(inbound))
    }

    /// Creates a connection error from a transport detail.
    #[inline]
    #[must_use]
    pub fn connection_error(detail: &str) -> Self {
        Self::ConnectionError(format!("connection error: {detail}"))
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::ConnectionError(_) => "connection-error",
            Self::FullSync(_) => "full-sync",
            Self::Push(_) => "push",
            Self::Remove { .. } => "remove",
            Self::MinimalPush { .. } => "minimal-push",
            Self::CallResult(_) => "call-result",
        }
    }
}

// ============================================================================
// Error Descriptions
// ============================================================================

/// Extracts a human-readable message from an error value.
///
/// Uses the `message` field of an error object if present, the text of a
/// string, and the JSON rendering of anything else.
#[must_use]
pub fn describe_error(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
