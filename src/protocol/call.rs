//! Remote call messages.
//!
//! pimatic exposes its API over socket.io as a single `call` event; the
//! server answers with a `callResult` event carrying the same `id`.
//!
//! # Format
//!
//! Call:
//! ```json
//! { "id": "uuid", "action": "getVariableByName", "params": { "name": "temp" } }
//! ```
//!
//! Result:
//! ```json
//! { "id": "uuid", "success": true, "result": { "variable": { ... } } }
//! { "id": "uuid", "success": false, "error": "variable not found" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::CallId;

// ============================================================================
// Constants
// ============================================================================

/// Error text used when a failed call result carries no error.
pub const UNKNOWN_CALL_ERROR: &str = "unknown error (check pimatic server log)";

// ============================================================================
// Action
// ============================================================================

/// Remote actions understood by the pimatic API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Write a variable.
    UpdateVariable,
    /// Read a variable.
    GetVariableByName,
    /// Invoke an action on a device.
    CallDeviceAction,
    /// Execute a rule action string.
    ExecuteAction,
}

impl Action {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdateVariable => "updateVariable",
            Self::GetVariableByName => "getVariableByName",
            Self::CallDeviceAction => "callDeviceAction",
            Self::ExecuteAction => "executeAction",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Call
// ============================================================================

/// An outbound `call` event.
#[derive(Debug, Clone, Serialize)]
pub struct Call {
    /// Correlation id echoed by the matching `callResult`.
    pub id: CallId,
    /// Remote action.
    pub action: Action,
    /// Action parameters.
    pub params: Value,
}

impl Call {
    /// Creates a call with a fresh id.
    #[inline]
    #[must_use]
    pub fn new(action: Action, params: Value) -> Self {
        Self {
            id: CallId::generate(),
            action,
            params,
        }
    }
}

// ============================================================================
// CallResult
// ============================================================================

/// An inbound `callResult` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResult {
    /// Id of the call being answered.
    pub id: CallId,

    /// Whether the server executed the call.
    #[serde(default)]
    pub success: bool,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error value (if failure). Not always a string.
    #[serde(default)]
    pub error: Option<Value>,
}

impl CallResult {
    /// Converts the reply into the caller's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallFailed`] when `success` is false.
    pub fn into_outcome(self, action: Action) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }

        let message = match self.error {
            None | Some(Value::Null) => UNKNOWN_CALL_ERROR.to_string(),
            Some(Value::String(text)) => text,
            Some(other) => super::describe_error(&other),
        };
        Err(Error::call_failed(action, message))
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Parameters of [`Action::UpdateVariable`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariableParams {
    /// Variable name.
    pub name: String,
    /// New value. pimatic also accepts expressions here.
    pub value_or_expression: Value,
    /// Always `"value"`: the variable is set to a literal.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Unit to store alongside the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl UpdateVariableParams {
    /// Creates parameters that set `name` to a literal value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value, unit: Option<String>) -> Self {
        Self {
            name: name.into(),
            value_or_expression: value,
            kind: "value",
            unit,
        }
    }
}

/// Parameters of [`Action::GetVariableByName`].
#[derive(Debug, Clone, Serialize)]
pub struct GetVariableParams {
    /// Variable name.
    pub name: String,
}

/// Parameters of [`Action::ExecuteAction`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteActionParams {
    /// Rule action, e.g. `switch on lamp1`.
    pub action_string: String,
}

/// Builds parameters of [`Action::CallDeviceAction`].
///
/// Entries of `extra` override `deviceId` and `actionName` on collision.
#[must_use]
pub fn device_action_params(device_id: &str, action_name: &str, extra: Map<String, Value>) -> Value {
    let mut params = Map::new();
    params.insert("deviceId".to_string(), Value::from(device_id));
    params.insert("actionName".to_string(), Value::from(action_name));
    params.extend(extra);
    Value::Object(params)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_call_serialization() {
        let call = Call::new(Action::GetVariableByName, json!({"name": "x"}));
        let json = serde_json::to_value(&call).expect("serialize");

        assert_eq!(json["action"], "getVariableByName");
        assert_eq!(json["params"]["name"], "x");
        assert_eq!(json["id"], call.id.to_string());
    }

    #[test]
    fn test_success_result() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "success": true,
            "result": {"variable": {"name": "x"}}
        }"#;

        let result: CallResult = serde_json::from_str(json_str).expect("parse");
        let value = result.into_outcome(Action::GetVariableByName).expect("success");
        assert_eq!(value["variable"]["name"], "x");
    }

    #[test]
    fn test_success_without_result_is_null() {
        let result = CallResult {
            id: CallId::generate(),
            success: true,
            result: None,
            error: None,
        };
        assert_eq!(result.into_outcome(Action::ExecuteAction).expect("ok"), Value::Null);
    }

    #[test]
    fn test_failure_defaults_error_text() {
        let json_str = r#"{"id": "550e8400-e29b-41d4-a716-446655440000", "success": false}"#;
        let result: CallResult = serde_json::from_str(json_str).expect("parse");

        let err = result.into_outcome(Action::UpdateVariable).unwrap_err();
        assert!(err.to_string().contains(UNKNOWN_CALL_ERROR));
    }

    #[test]
    fn test_failure_with_error_object() {
        let result = CallResult {
            id: CallId::generate(),
            success: false,
            result: None,
            error: Some(json!({"message": "device not found"})),
        };
        let err = result.into_outcome(Action::CallDeviceAction).unwrap_err();
        assert_eq!(err.to_string(), "callDeviceAction failed: device not found");
    }

    #[test]
    fn test_update_variable_params() {
        let params = UpdateVariableParams::new("temp", json!(21), Some("°C".to_string()));
        let json = serde_json::to_value(&params).expect("serialize");
        assert_eq!(
            json,
            json!({"name": "temp", "valueOrExpression": 21, "type": "value", "unit": "°C"})
        );

        let no_unit = serde_json::to_value(UpdateVariableParams::new("t", json!(1), None))
            .expect("serialize");
        assert!(no_unit.get("unit").is_none());
    }

    #[test]
    fn test_device_action_params_extra_wins() {
        let mut extra = Map::new();
        extra.insert("dimlevel".to_string(), json!(40));
        extra.insert("actionName".to_string(), json!("changeDimlevelTo"));

        let params = device_action_params("dimmer1", "turnOn", extra);
        assert_eq!(params["deviceId"], "dimmer1");
        assert_eq!(params["actionName"], "changeDimlevelTo");
        assert_eq!(params["dimlevel"], 40);
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::ExecuteAction.to_string(), "executeAction");
        let parsed: Action = serde_json::from_value(json!("callDeviceAction")).expect("parse");
        assert_eq!(parsed, Action::CallDeviceAction);
    }
}
