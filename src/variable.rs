//! Mirrored pimatic variables.
//!
//! A [`Variable`] is the local copy of one named piece of server state.
//! Values are kept as raw JSON because pimatic variables may hold numbers,
//! strings or booleans depending on the device attribute behind them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::RemoteVariable;

// ============================================================================
// VariableType
// ============================================================================

/// Kind of a pimatic variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Plain value set by rules or API calls.
    Value,
    /// Value computed from an expression.
    Expression,
    /// Device attribute exposed as a variable.
    Attribute,
    /// Type not reported yet, e.g. after a minimal push for an unseen name.
    #[default]
    #[serde(other)]
    Unknown,
}

impl VariableType {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Expression => "expression",
            Self::Attribute => "attribute",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Variable
// ============================================================================

/// Last known state of a remote variable.
///
/// Owned by the controller's cache; every accessor hands out clones.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Unique variable name (without the leading `$`).
    pub name: String,
    /// Variable kind.
    pub variable_type: VariableType,
    /// Current value.
    pub value: Value,
    /// Display unit, empty when the variable has none.
    pub unit: String,
    /// Whether the server refuses writes.
    pub readonly: bool,
    /// Local time the value was recorded.
    pub timestamp: SystemTime,
}

impl Variable {
    /// Normalises a wire record, stamping it with `timestamp`.
    #[must_use]
    pub fn from_remote(remote: RemoteVariable, timestamp: SystemTime) -> Self {
        Self {
            name: remote.name,
            variable_type: remote.variable_type.unwrap_or_default(),
            value: remote.value,
            unit: remote.unit.unwrap_or_default(),
            readonly: remote.readonly.unwrap_or(false),
            timestamp,
        }
    }

    /// Builds a record for a name seen only through a minimal value push.
    ///
    /// Unknown variables are treated as readonly until a full record arrives.
    #[must_use]
    pub fn placeholder(name: impl Into<String>, value: Value, timestamp: SystemTime) -> Self {
        Self {
            name: name.into(),
            variable_type: VariableType::Unknown,
            value,
            unit: String::new(),
            readonly: true,
            timestamp,
        }
    }

    /// Milliseconds since the Unix epoch of [`timestamp`](Self::timestamp).
    #[must_use]
    pub fn time_millis(&self) -> u64 {
        epoch_millis(self.timestamp)
    }
}

/// Milliseconds since the Unix epoch; zero before it.
pub(crate) fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_variable_type_from_wire() {
        let t: VariableType = serde_json::from_value(json!("expression")).expect("parse");
        assert_eq!(t, VariableType::Expression);

        let other: VariableType = serde_json::from_value(json!("something-new")).expect("parse");
        assert_eq!(other, VariableType::Unknown);
    }

    #[test]
    fn test_from_remote_fills_defaults() {
        let remote: RemoteVariable =
            serde_json::from_value(json!({"name": "temp", "value": 21.5, "unit": null}))
                .expect("parse");
        let variable = Variable::from_remote(remote, UNIX_EPOCH);

        assert_eq!(variable.name, "temp");
        assert_eq!(variable.variable_type, VariableType::Unknown);
        assert_eq!(variable.unit, "");
        assert!(!variable.readonly);
        assert_eq!(variable.value, json!(21.5));
    }

    #[test]
    fn test_placeholder_is_readonly_unknown() {
        let variable = Variable::placeholder("temp", json!(3), UNIX_EPOCH);
        assert_eq!(variable.variable_type, VariableType::Unknown);
        assert_eq!(variable.unit, "");
        assert!(variable.readonly);
    }

    #[test]
    fn test_time_millis() {
        let ts = UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        let variable = Variable::placeholder("x", Value::Null, ts);
        assert_eq!(variable.time_millis(), 1_500);
    }

    #[test]
    fn test_epoch_millis_before_epoch_is_zero() {
        let before = UNIX_EPOCH - std::time::Duration::from_secs(1);
        assert_eq!(epoch_millis(before), 0);
        assert_eq!(epoch_millis(UNIX_EPOCH + std::time::Duration::from_secs(2)), 2_000);
    }
}
