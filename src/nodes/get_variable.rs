//! Node emitting a variable's value.
//!
//! Emits on every change, on every input, or both, depending on
//! [`OutputMode`].

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::controller::{Controller, Notification};
use crate::error::{Error, Result};

use super::status::NodeStatus;
use super::support::{Message, Registration, normalize_variable_name, variable_message};

// ============================================================================
// Configuration
// ============================================================================

/// When a [`GetVariableNode`] produces output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Only when the variable changes.
    OnChange,
    /// Only when an input message arrives.
    OnInput,
    /// On both.
    #[default]
    #[serde(other)]
    Always,
}

/// Settings of a [`GetVariableNode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetVariableConfig {
    /// Variable name; a leading `$` is allowed.
    pub variable: String,
    /// When to emit.
    pub output: OutputMode,
    /// Suppress change output when the value did not change.
    pub filter: bool,
}

// ============================================================================
// GetVariableNode
// ============================================================================

/// Reads a variable on demand and follows its changes.
pub struct GetVariableNode {
    registration: Registration,
    variable: String,
    output: OutputMode,
    filter: bool,
    last_emitted: Option<Value>,
    status: NodeStatus,
}

impl GetVariableNode {
    /// Creates the node and subscribes to its variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the variable name is blank.
    pub fn new(controller: &Controller, config: GetVariableConfig) -> Result<Self> {
        let variable = normalize_variable_name(&config.variable);
        if variable.is_empty() {
            return Err(Error::config("invalid node configuration: variable is required"));
        }

        Ok(Self {
            registration: Registration::new(controller, &variable),
            variable,
            output: config.output,
            filter: config.filter,
            last_emitted: None,
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

    /// Applies a notification; returns the message to emit, if any.
    pub fn on_notification(&mut self, notification: Notification) -> Option<Message> {
        match notification {
            Notification::ValueChanged(variable) if variable.name == self.variable => {
                self.status = NodeStatus::Ok;
                if self.output == OutputMode::OnInput {
                    return None;
                }
                if self.filter && self.last_emitted.as_ref() == Some(&variable.value) {
                    debug!(variable = %self.variable, "Unchanged value filtered");
                    return None;
                }
                self.last_emitted = Some(variable.value.clone());
                Some(variable_message(&variable))
            }
            Notification::ValueChanged(_) => None,
            Notification::NotFound(name) => {
                error!(variable = %name, "variable not found");
                self.status = NodeStatus::error("variable not found");
                None
            }
            Notification::ConnectionError(message) => {
                error!(error = %message, variable = %self.variable, "Connection error");
                self.status = NodeStatus::error(message);
                None
            }
            Notification::Connected => None,
        }
    }

    /// Waits for the next change output.
    ///
    /// Returns `None` only if the notification channel closed.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let notification = self.registration.next().await?;
            if let Some(msg) = self.on_notification(notification) {
                return Some(msg);
            }
        }
    }

    /// Applies every queued notification and returns the outputs.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(notification) = self.registration.try_next() {
            out.extend(self.on_notification(notification));
        }
        out
    }

    /// Handles an input message.
    ///
    /// Returns `Ok(None)` when input does not trigger output.
    ///
    /// # Errors
    ///
    /// - [`Error::VariableNotFound`] if the variable is not known
    /// - any error of [`Controller::get_variable_value`]
    pub async fn on_input(&mut self, _msg: &Message) -> Result<Option<Message>> {
        if self.output == OutputMode::OnChange {
            debug!(variable = %self.variable, "Input ignored, output is on change");
            return Ok(None);
        }

        let controller = self.registration.controller();
        if controller.variable(&self.variable).is_none() {
            error!(variable = %self.variable, "variable not found");
            self.status = NodeStatus::error("variable not found");
            return Err(Error::variable_not_found(self.variable.as_str()));
        }

        match controller.get_variable_value(&self.variable).await {
            Ok(variable) => {
                self.status = NodeStatus::Ok;
                Ok(Some(variable_message(&variable)))
            }
            Err(e) => {
                error!(variable = %self.variable, error = %e, "getVariable failed");
                self.status = NodeStatus::error(e.to_string());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for GetVariableNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetVariableNode")
            .field("variable", &self.variable)
            .field("output", &self.output)
            .field("filter", &self.filter)
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

    use crate::nodes::support::testing::{controller, drain, reply_ok, sync};
    use crate::protocol::event::{VARIABLE_ADDED, VARIABLE_VALUE_CHANGED};

    fn config(variable: &str, output: OutputMode, filter: bool) -> GetVariableConfig {
        GetVariableConfig {
            variable: variable.to_string(),
            output,
            filter,
        }
    }

    #[test]
    fn test_config_deserialize() {
        let config: GetVariableConfig =
            serde_json::from_value(json!({"variable": "$temp", "output": "on-input", "filter": true}))
                .expect("config");
        assert_eq!(config.output, OutputMode::OnInput);
        assert!(config.filter);

        let config: GetVariableConfig =
            serde_json::from_value(json!({"variable": "temp", "output": "both"})).expect("config");
        assert_eq!(config.output, OutputMode::Always);
    }

    #[tokio::test]
    async fn test_rejects_blank_variable() {
        let (controller, transport) = controller();
        let result = GetVariableNode::new(&controller, config(" $ ", OutputMode::Always, false));
        assert!(matches!(result, Err(Error::Config { .. })));
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_change_output_with_filter() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config(" $temp", OutputMode::Always, true))
            .expect("node");
        assert_eq!(node.variable(), "temp");

        sync(&transport, json!([{"name": "temp", "value": 20, "unit": "°C", "type": "value"}])).await;
        for value in [21, 21, 22] {
            transport.inject(
                VARIABLE_VALUE_CHANGED,
                json!({"variableName": "temp", "variableValue": value}),
            );
        }
        drain().await;

        let payloads: Vec<Value> = node.drain().into_iter().map(|msg| msg["payload"].clone()).collect();
        assert_eq!(payloads, vec![json!(20), json!(21), json!(22)]);
        assert_eq!(node.status(), &NodeStatus::Ok);
    }

    #[tokio::test]
    async fn test_recv_waits_for_change() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config("temp", OutputMode::OnChange, false))
            .expect("node");

        transport.inject(VARIABLE_ADDED, json!({"name": "temp", "value": 7, "unit": "W"}));
        let msg = node.recv().await.expect("output");

        assert_eq!(msg["payload"], json!(7));
        assert_eq!(msg["unit"], json!("W"));
        assert_eq!(msg["name"], json!("temp"));
    }

    #[tokio::test]
    async fn test_on_input_mode_suppresses_change_output() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config("temp", OutputMode::OnInput, false))
            .expect("node");

        sync(&transport, json!([{"name": "temp", "value": 20}])).await;
        assert!(node.drain().is_empty());
        assert_eq!(node.status(), &NodeStatus::Ok);
    }

    #[tokio::test]
    async fn test_on_change_mode_ignores_input() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config("temp", OutputMode::OnChange, false))
            .expect("node");
        sync(&transport, json!([{"name": "temp", "value": 20}])).await;

        assert!(node.on_input(&Message::new()).await.expect("input").is_none());
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_input_reads_through_controller() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config("temp", OutputMode::Always, false))
            .expect("node");
        sync(&transport, json!([{"name": "temp", "value": 20}])).await;

        let input = Message::new();
        let (output, call) = tokio::join!(
            node.on_input(&input),
            reply_ok(&transport, json!({"variable": {"name": "temp", "value": 25, "type": "value"}}))
        );

        assert_eq!(call["action"], "getVariableByName");
        let msg = output.expect("input").expect("output");
        assert_eq!(msg["payload"], json!(25));
        assert_eq!(msg["type"], json!("value"));
    }

    #[tokio::test]
    async fn test_input_for_unknown_variable_fails() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config("ghost", OutputMode::Always, false))
            .expect("node");
        sync(&transport, json!([])).await;
        node.drain();
        assert_eq!(node.status(), &NodeStatus::error("variable not found"));

        let err = node.on_input(&Message::new()).await.expect_err("unknown");
        assert!(matches!(err, Error::VariableNotFound { ref name } if name == "ghost"));
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_connection_error_sets_status() {
        let (controller, transport) = controller();
        let mut node = GetVariableNode::new(&controller, config("temp", OutputMode::Always, false))
            .expect("node");

        transport.fail_connect("ECONNREFUSED");
        drain().await;
        node.drain();
        assert_eq!(
            node.status(),
            &NodeStatus::error("connection error: ECONNREFUSED")
        );
    }

    #[tokio::test]
    async fn test_drop_deregisters() {
        let (controller, transport) = controller();
        let node = GetVariableNode::new(&controller, config("temp", OutputMode::Always, false))
            .expect("node");
        assert_eq!(controller.subscriber_count(), 1);

        drop(node);
        assert_eq!(controller.subscriber_count(), 0);
        assert!(!transport.is_open());
    }
}
