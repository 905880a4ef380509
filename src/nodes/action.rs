//! Nodes invoking device actions and rule actions.
//!
//! Both subscribe to the `#action` channel so the connection stays open
//! while they exist, and both report outcomes the same way:
//!
//! | Outcome | `message_on_error` | Result |
//! |---------|--------------------|--------|
//! | success | any | `Ok(msg)` with `success: true` |
//! | failure | `true` | `Ok(msg)` with `success: false` and `error` |
//! | failure | `false` | `Err(error)` |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::controller::{ACTION_CHANNEL, Controller, Notification};
use crate::error::{Error, Result};
use crate::template;

use super::status::NodeStatus;
use super::support::{Message, Registration, is_truthy, non_blank, now_millis};

// ============================================================================
// Configuration
// ============================================================================

/// Settings of a [`DeviceActionNode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceActionConfig {
    /// Target device.
    pub device_id: String,
    /// Action name, e.g. `turnOn`.
    pub action: String,
    /// Argument name; falls back to `msg.parameterName`.
    pub parameter_name: Option<String>,
    /// Argument value; falls back to `msg.parameterValue`, then `msg.payload`.
    pub parameter_value: Option<String>,
    /// Emit a failure message instead of returning the error.
    pub message_on_error: bool,
}

/// Settings of a [`RuleActionNode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleActionConfig {
    /// Rule action with `${path}` references into the input message.
    pub action_expression: String,
    /// Emit a failure message instead of returning the error.
    pub message_on_error: bool,
}

// ============================================================================
// DeviceActionNode
// ============================================================================

/// Calls a device action on every input message.
pub struct DeviceActionNode {
    registration: Registration,
    device_id: String,
    action: String,
    parameter_name: Option<String>,
    parameter_value: Option<String>,
    message_on_error: bool,
    status: NodeStatus,
}

impl DeviceActionNode {
    /// Creates the node and subscribes to the action channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the device id or action is blank.
    pub fn new(controller: &Controller, config: DeviceActionConfig) -> Result<Self> {
        let (Some(device_id), Some(action)) = (
            non_blank(Some(config.device_id.as_str())),
            non_blank(Some(config.action.as_str())),
        ) else {
            return Err(Error::config(
                "invalid node configuration: device id and action are required",
            ));
        };

        Ok(Self {
            registration: Registration::new(controller, ACTION_CHANNEL),
            device_id: device_id.to_string(),
            action: action.to_string(),
            parameter_name: non_blank(config.parameter_name.as_deref()).map(str::to_string),
            parameter_value: non_blank(config.parameter_value.as_deref()).map(str::to_string),
            message_on_error: config.message_on_error,
            status: NodeStatus::Idle,
        })
    }

    /// Current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    /// Applies every queued notification.
    pub fn refresh_status(&mut self) -> &NodeStatus {
        while let Some(notification) = self.registration.try_next() {
            apply_connection(&mut self.status, &notification);
        }
        &self.status
    }

    /// Action arguments taken from configuration and `msg`.
    fn arguments(&self, msg: &Message) -> Map<String, Value> {
        let mut extra = Map::new();

        let name = self.parameter_name.clone().or_else(|| {
            msg.get("parameterName")
                .and_then(Value::as_str)
                .and_then(|name| non_blank(Some(name)))
                .map(str::to_string)
        });
        let Some(name) = name else {
            return extra;
        };

        let value = match &self.parameter_value {
            Some(value) => Value::from(value.as_str()),
            None => msg
                .get("parameterValue")
                .filter(|value| is_truthy(value))
                .or_else(|| msg.get("payload"))
                .cloned()
                .unwrap_or(Value::Null),
        };
        extra.insert(name, value);
        extra
    }

    /// Handles an input message.
    ///
    /// # Errors
    ///
    /// Any error of [`Controller::execute_device_action`], unless
    /// `message_on_error` is set.
    pub async fn on_input(&mut self, msg: &Message) -> Result<Message> {
        self.refresh_status();
        let extra = self.arguments(msg);
        debug!(device = %self.device_id, action = %self.action, "Calling device action");

        let outcome = self
            .registration
            .controller()
            .execute_device_action(&self.device_id, &self.action, extra)
            .await;

        match outcome {
            Ok(result) => {
                self.status = NodeStatus::Ok;
                let mut out = outcome_message(field_or_empty(&result, "result"), true);
                out.insert("deviceId".into(), Value::from(self.device_id.as_str()));
                out.insert("action".into(), Value::from(self.action.as_str()));
                Ok(out)
            }
            Err(e) => {
                error!(device = %self.device_id, action = %self.action, error = %e, "deviceAction failed");
                self.status = NodeStatus::error(e.to_string());
                if !self.message_on_error {
                    return Err(e);
                }
                let mut out = failure_message(&e);
                out.insert("deviceId".into(), Value::from(self.device_id.as_str()));
                out.insert("action".into(), Value::from(self.action.as_str()));
                Ok(out)
            }
        }
    }
}

impl std::fmt::Debug for DeviceActionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceActionNode")
            .field("device_id", &self.device_id)
            .field("action", &self.action)
            .field("parameter_name", &self.parameter_name)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RuleActionNode
// ============================================================================

/// Executes a templated rule action on every input message.
pub struct RuleActionNode {
    registration: Registration,
    action_expression: String,
    message_on_error: bool,
    status: NodeStatus,
}

impl RuleActionNode {
    /// Creates the node and subscribes to the action channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the expression is blank.
    pub fn new(controller: &Controller, config: RuleActionConfig) -> Result<Self> {
        let Some(expression) = non_blank(Some(config.action_expression.as_str())) else {
            return Err(Error::config(
                "invalid node configuration: action expression is required",
            ));
        };

        Ok(Self {
            registration: Registration::new(controller, ACTION_CHANNEL),
            action_expression: expression.to_string(),
            message_on_error: config.message_on_error,
            status: NodeStatus::Idle,
        })
    }

    /// Current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    /// Applies every queued notification.
    pub fn refresh_status(&mut self) -> &NodeStatus {
        while let Some(notification) = self.registration.try_next() {
            apply_connection(&mut self.status, &notification);
        }
        &self.status
    }

    /// Handles an input message.
    ///
    /// # Errors
    ///
    /// [`Error::UnresolvedReference`] or any error of
    /// [`Controller::execute_rule_action`], unless `message_on_error` is set.
    pub async fn on_input(&mut self, msg: &Message) -> Result<Message> {
        self.refresh_status();

        let outcome = match template::expand(&self.action_expression, &Value::Object(msg.clone())) {
            Ok(action_string) => {
                debug!(action = %action_string, "Executing rule action");
                self.registration
                    .controller()
                    .execute_rule_action(&action_string)
                    .await
                    .map(|result| (action_string, result))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((action_string, result)) => {
                self.status = NodeStatus::Ok;
                let mut out = outcome_message(field_or_empty(&result, "message"), true);
                out.insert("action".into(), Value::from(action_string));
                Ok(out)
            }
            Err(e) => {
                error!(expression = %self.action_expression, error = %e, "ruleAction failed");
                self.status = NodeStatus::error(e.to_string());
                if !self.message_on_error {
                    return Err(e);
                }
                let mut out = failure_message(&e);
                out.insert("action".into(), Value::from(self.action_expression.as_str()));
                Ok(out)
            }
        }
    }
}

impl std::fmt::Debug for RuleActionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleActionNode")
            .field("action_expression", &self.action_expression)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn apply_connection(status: &mut NodeStatus, notification: &Notification) {
    if let Some(next) = NodeStatus::from_connection(notification) {
        if let NodeStatus::Error(message) = &next {
            error!(error = %message, "Connection error");
        }
        *status = next;
    }
}

/// `result[key]`, or `""` when missing or null.
fn field_or_empty(result: &Value, key: &str) -> Value {
    result
        .get(key)
        .filter(|value| !value.is_null())
        .cloned()
        .unwrap_or_else(|| Value::from(""))
}

fn outcome_message(payload: Value, success: bool) -> Message {
    let mut out = Message::new();
    out.insert("payload".into(), payload);
    out.insert("success".into(), Value::from(success));
    out.insert("time".into(), Value::from(now_millis()));
    out
}

fn failure_message(error: &Error) -> Message {
    let mut out = outcome_message(Value::from(""), false);
    out.insert("error".into(), Value::from(error.to_string()));
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::nodes::support::testing::{controller, drain, reply, reply_ok, sync};

    fn device(parameter_name: Option<&str>, parameter_value: Option<&str>) -> DeviceActionConfig {
        DeviceActionConfig {
            device_id: "dimmer1".into(),
            action: "changeDimlevelTo".into(),
            parameter_name: parameter_name.map(str::to_string),
            parameter_value: parameter_value.map(str::to_string),
            message_on_error: false,
        }
    }

    fn message(value: Value) -> Message {
        match value {
            Value::Object(map) => map,
            _ => Message::new(),
        }
    }

    #[tokio::test]
    async fn test_device_config_requires_ids() {
        let (controller, _transport) = controller();
        let mut config = device(None, None);
        config.action = "  ".into();
        assert!(matches!(
            DeviceActionNode::new(&controller, config),
            Err(Error::Config { .. })
        ));
        assert_eq!(controller.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_registers_on_action_channel() {
        let (controller, transport) = controller();
        let node = DeviceActionNode::new(&controller, device(None, None)).expect("node");
        assert_eq!(controller.subscriber_count(), 1);
        assert!(transport.is_open());

        sync(&transport, json!([])).await;
        drop(node);
        assert_eq!(controller.subscriber_count(), 0);
        assert!(!transport.is_open());
    }

    #[test]
    fn test_arguments_precedence() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let _guard = runtime.enter();
        let (controller, _transport) = controller();

        let configured = DeviceActionNode::new(&controller, device(Some("dimlevel"), Some("40")))
            .expect("node");
        assert_eq!(
            Value::Object(configured.arguments(&message(json!({"payload": 10})))),
            json!({"dimlevel": "40"})
        );

        let from_msg = DeviceActionNode::new(&controller, device(None, None)).expect("node");
        assert_eq!(
            Value::Object(from_msg.arguments(&message(
                json!({"parameterName": "dimlevel", "parameterValue": 30, "payload": 10})
            ))),
            json!({"dimlevel": 30})
        );
        assert_eq!(
            Value::Object(from_msg.arguments(&message(
                json!({"parameterName": "dimlevel", "parameterValue": 0, "payload": 10})
            ))),
            json!({"dimlevel": 10})
        );
        assert!(from_msg.arguments(&message(json!({"payload": 10}))).is_empty());
    }

    #[tokio::test]
    async fn test_device_action_success() {
        let (controller, transport) = controller();
        let mut node = DeviceActionNode::new(&controller, device(Some("dimlevel"), None))
            .expect("node");
        sync(&transport, json!([])).await;
        assert_eq!(node.refresh_status(), &NodeStatus::Ok);

        let input = message(json!({"payload": 40}));
        let (output, call) = tokio::join!(
            node.on_input(&input),
            reply_ok(&transport, json!({"result": true}))
        );

        assert_eq!(call["action"], "callDeviceAction");
        assert_eq!(call["params"]["deviceId"], "dimmer1");
        assert_eq!(call["params"]["actionName"], "changeDimlevelTo");
        assert_eq!(call["params"]["dimlevel"], 40);

        let out = output.expect("output");
        assert_eq!(out["payload"], json!(true));
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["deviceId"], "dimmer1");
        assert_eq!(out["action"], "changeDimlevelTo");
        assert!(out["time"].as_u64().is_some_and(|t| t > 0));
    }

    #[tokio::test]
    async fn test_device_action_missing_result_is_empty() {
        let (controller, transport) = controller();
        let mut node = DeviceActionNode::new(&controller, device(None, None)).expect("node");
        sync(&transport, json!([])).await;

        let input = Message::new();
        let (output, _) = tokio::join!(
            node.on_input(&input),
            reply_ok(&transport, json!({}))
        );
        assert_eq!(output.expect("output")["payload"], "");
    }

    #[tokio::test]
    async fn test_device_action_failure_modes() {
        let (controller, transport) = controller();
        let mut node = DeviceActionNode::new(&controller, device(None, None)).expect("node");
        sync(&transport, json!([])).await;

        let input = Message::new();
        let (output, _) = tokio::join!(
            node.on_input(&input),
            reply(&transport, json!({"success": false, "error": {"message": "no such device"}}))
        );
        let err = output.expect_err("failed");
        assert_eq!(err.to_string(), "callDeviceAction failed: no such device");
        assert!(node.status().is_error());

        let mut config = device(None, None);
        config.message_on_error = true;
        let mut node = DeviceActionNode::new(&controller, config).expect("node");
        let input = Message::new();
        let (output, _) = tokio::join!(
            node.on_input(&input),
            reply(&transport, json!({"success": false, "error": "busy"}))
        );
        let out = output.expect("failure message");
        assert_eq!(out["success"], json!(false));
        assert_eq!(out["payload"], "");
        assert_eq!(out["error"], "callDeviceAction failed: busy");
        assert_eq!(out["deviceId"], "dimmer1");
    }

    #[tokio::test]
    async fn test_device_action_without_connection() {
        let (controller, _transport) = controller();
        let mut config = device(None, None);
        config.message_on_error = true;
        let mut node = DeviceActionNode::new(&controller, config).expect("node");
        controller.deregister_all();

        let out = node.on_input(&Message::new()).await.expect("failure message");
        assert_eq!(out["error"], "socket not ready");
        assert_eq!(node.status(), &NodeStatus::error("socket not ready"));
    }

    #[tokio::test]
    async fn test_rule_action_expands_message() {
        let (controller, transport) = controller();
        let mut node = RuleActionNode::new(
            &controller,
            RuleActionConfig {
                action_expression: "switch ${payload.state} ${device}".into(),
                message_on_error: false,
            },
        )
        .expect("node");
        sync(&transport, json!([])).await;

        let input = message(json!({"payload": {"state": "on"}, "device": "lamp1"}));
        let (output, call) = tokio::join!(
            node.on_input(&input),
            reply_ok(&transport, json!({"message": "switched lamp1 on"}))
        );

        assert_eq!(call["action"], "executeAction");
        assert_eq!(call["params"], json!({"actionString": "switch on lamp1"}));
        let out = output.expect("output");
        assert_eq!(out["payload"], "switched lamp1 on");
        assert_eq!(out["action"], "switch on lamp1");
        assert_eq!(out["success"], json!(true));
    }

    #[tokio::test]
    async fn test_rule_action_unresolved_reference() {
        let (controller, transport) = controller();
        let mut node = RuleActionNode::new(
            &controller,
            RuleActionConfig {
                action_expression: "turn on ${room.light}".into(),
                message_on_error: true,
            },
        )
        .expect("node");
        sync(&transport, json!([])).await;

        let out = node
            .on_input(&message(json!({"room": {}})))
            .await
            .expect("failure message");
        assert_eq!(out["success"], json!(false));
        assert_eq!(out["error"], "variable \"room.light\" is not defined");
        assert_eq!(out["action"], "turn on ${room.light}");
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_connection_status_updates() {
        let (controller, transport) = controller();
        let mut node = RuleActionNode::new(
            &controller,
            RuleActionConfig {
                action_expression: "restart".into(),
                message_on_error: false,
            },
        )
        .expect("node");

        transport.fail_connect("ECONNREFUSED");
        drain().await;
        assert_eq!(
            node.refresh_status(),
            &NodeStatus::error("connection error: ECONNREFUSED")
        );

        transport.connect();
        drain().await;
        assert_eq!(node.refresh_status(), &NodeStatus::Ok);
    }
}
