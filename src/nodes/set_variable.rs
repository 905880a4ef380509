//! Node writing a variable.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::controller::{Controller, Notification};
use crate::error::{Error, Result};

use super::status::NodeStatus;
use super::support::{
    Message, Registration, is_truthy, non_blank, normalize_variable_name, variable_message,
};

// ============================================================================
// Configuration
// ============================================================================

/// Settings of a [`SetVariableNode`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetVariableConfig {
    /// Variable name; a leading `$` is allowed.
    pub variable: String,
    /// Fixed value to write. Falsy values defer to `msg.payload`.
    pub value: Option<Value>,
    /// Unit stored with the value.
    pub unit: Option<String>,
}

// ============================================================================
// SetVariableNode
// ============================================================================

/// Writes a variable on every input message.
pub struct SetVariableNode {
    registration: Registration,
    variable: String,
    value: Option<Value>,
    unit: Option<String>,
    status: NodeStatus,
}

impl SetVariableNode {
    /// Creates the node and subscribes to its variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the variable name is blank.
    pub fn new(controller: &Controller, config: SetVariableConfig) -> Result<Self> {
        let variable = normalize_variable_name(&config.variable);
        if variable.is_empty() {
            return Err(Error::config("invalid node configuration: variable is required"));
        }

        Ok(Self {
            registration: Registration::new(controller, &variable),
            variable,
            value: config.value.filter(is_truthy),
            unit: non_blank(config.unit.as_deref()).map(str::to_string),
            status: NodeStatus::Idle,
        })
    }

    /// The normalised variable name.
    #[inline]
    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    /// Applies a notification to the status.
    pub fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::ValueChanged(variable) if variable.name == self.variable => {
                self.status = if variable.readonly {
                    NodeStatus::error("variable is readonly")
                } else {
                    NodeStatus::Ok
                };
            }
            Notification::ValueChanged(_) | Notification::Connected => {}
            Notification::NotFound(name) => {
                error!(variable = %name, "variable not found");
                self.status = NodeStatus::error("variable not found");
            }
            Notification::ConnectionError(message) => {
                error!(error = %message, variable = %self.variable, "Connection error");
                self.status = NodeStatus::error(message);
            }
        }
    }

    /// Applies every queued notification.
    pub fn refresh_status(&mut self) -> &NodeStatus {
        while let Some(notification) = self.registration.try_next() {
            self.on_notification(notification);
        }
        &self.status
    }

    /// Handles an input message and returns the written variable.
    ///
    /// Writes the configured value, or `msg.payload` when none is set.
    ///
    /// # Errors
    ///
    /// - [`Error::VariableNotFound`] if the variable is not known
    /// - [`Error::ReadOnlyVariable`] if the variable refuses writes
    /// - any error of [`Controller::set_variable_value`]
    pub async fn on_input(&mut self, msg: &Message) -> Result<Message> {
        self.refresh_status();

        let controller = self.registration.controller();
        let Some(current) = controller.variable(&self.variable) else {
            error!(variable = %self.variable, "variable not found");
            self.status = NodeStatus::error("variable not found");
            return Err(Error::variable_not_found(self.variable.as_str()));
        };
        if current.readonly {
            error!(variable = %self.variable, "variable is readonly");
            self.status = NodeStatus::error("variable is readonly");
            return Err(Error::read_only_variable(self.variable.as_str()));
        }

        let value = self
            .value
            .clone()
            .unwrap_or_else(|| msg.get("payload").cloned().unwrap_or(Value::Null));
        debug!(variable = %self.variable, value = %value, "Setting variable");

        match controller
            .set_variable_value(&self.variable, value, self.unit.as_deref())
            .await
        {
            Ok(variable) => {
                self.status = NodeStatus::Ok;
                Ok(variable_message(&variable))
            }
            Err(e) => {
                error!(variable = %self.variable, error = %e, "setVariable failed");
                self.status = NodeStatus::error(e.to_string());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SetVariableNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetVariableNode")
            .field("variable", &self.variable)
            .field("value", &self.value)
            .field("unit", &self.unit)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::nodes::support::testing::{controller, reply_ok, sync};

    fn config(variable: &str, value: Option<Value>, unit: Option<&str>) -> SetVariableConfig {
        SetVariableConfig {
            variable: variable.to_string(),
            value,
            unit: unit.map(str::to_string),
        }
    }

    fn payload(value: Value) -> Message {
        let mut msg = Message::new();
        msg.insert("payload".into(), value);
        msg
    }

    #[tokio::test]
    async fn test_rejects_blank_variable() {
        let (controller, _transport) = controller();
        let result = SetVariableNode::new(&controller, config("", None, None));
        assert!(matches!(result, Err(Error::Config { .. })));
        assert_eq!(controller.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_writes_payload() {
        let (controller, transport) = controller();
        let mut node = SetVariableNode::new(&controller, config("$target", None, Some(" °C ")))
            .expect("node");
        sync(&transport, json!([{"name": "target", "value": 18, "unit": "°C"}])).await;
        assert_eq!(node.refresh_status(), &NodeStatus::Ok);

        let input = payload(json!(21));
        let (output, call) = tokio::join!(
            node.on_input(&input),
            reply_ok(&transport, json!({"variable": {"name": "target", "value": 21, "unit": "°C"}}))
        );

        assert_eq!(call["action"], "updateVariable");
        assert_eq!(
            call["params"],
            json!({"name": "target", "valueOrExpression": 21, "type": "value", "unit": "°C"})
        );
        let msg = output.expect("output");
        assert_eq!(msg["payload"], json!(21));
        assert_eq!(controller.variable("target").expect("cached").value, json!(21));
    }

    #[tokio::test]
    async fn test_configured_value_wins_over_payload() {
        let (controller, transport) = controller();
        let mut node = SetVariableNode::new(&controller, config("mode", Some(json!("away")), None))
            .expect("node");
        sync(&transport, json!([{"name": "mode", "value": "home"}])).await;

        let input = payload(json!("ignored"));
        let (output, call) = tokio::join!(
            node.on_input(&input),
            reply_ok(&transport, json!({"variable": {"name": "mode", "value": "away"}}))
        );

        assert_eq!(call["params"]["valueOrExpression"], "away");
        assert!(call["params"].get("unit").is_none());
        assert_eq!(output.expect("output")["payload"], "away");
    }

    #[tokio::test]
    async fn test_readonly_variable_refused() {
        let (controller, transport) = controller();
        let mut node = SetVariableNode::new(&controller, config("uptime", None, None))
            .expect("node");
        sync(&transport, json!([{"name": "uptime", "value": 5, "readonly": true}])).await;
        assert_eq!(node.refresh_status(), &NodeStatus::error("variable is readonly"));

        let err = node.on_input(&payload(json!(1))).await.expect_err("readonly");
        assert!(matches!(err, Error::ReadOnlyVariable { ref name } if name == "uptime"));
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_variable_refused() {
        let (controller, transport) = controller();
        let mut node = SetVariableNode::new(&controller, config("ghost", None, None))
            .expect("node");
        sync(&transport, json!([])).await;

        let err = node.on_input(&payload(json!(1))).await.expect_err("unknown");
        assert!(matches!(err, Error::VariableNotFound { .. }));
        assert_eq!(node.status(), &NodeStatus::error("variable not found"));
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_server_rejection_sets_status() {
        let (controller, transport) = controller();
        let mut node = SetVariableNode::new(&controller, config("target", None, None))
            .expect("node");
        sync(&transport, json!([{"name": "target", "value": 18}])).await;

        let input = payload(json!("x"));
        let (output, _) = tokio::join!(
            node.on_input(&input),
            crate::nodes::support::testing::reply(
                &transport,
                json!({"success": false, "error": "not a number"})
            )
        );

        let err = output.expect_err("rejected");
        assert!(err.is_call_failure());
        assert_eq!(node.status(), &NodeStatus::error("updateVariable failed: not a number"));
    }
}
