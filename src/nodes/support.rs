//! Shared pieces of the flow nodes.

// ============================================================================
// Imports
// ============================================================================

use std::time::SystemTime;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::controller::{Controller, Notification, Subscriber};
use crate::variable::{Variable, epoch_millis};

// ============================================================================
// Message
// ============================================================================

/// A flow message: a JSON object, usually with a `payload`.
pub type Message = Map<String, Value>;

/// Output message describing a variable.
///
/// `{payload, name, type, unit, readonly, time}`
#[must_use]
pub fn variable_message(variable: &Variable) -> Message {
    let mut msg = Message::new();
    msg.insert("payload".into(), variable.value.clone());
    msg.insert("name".into(), Value::from(variable.name.as_str()));
    msg.insert("type".into(), Value::from(variable.variable_type.as_str()));
    msg.insert("unit".into(), Value::from(variable.unit.as_str()));
    msg.insert("readonly".into(), Value::from(variable.readonly));
    msg.insert("time".into(), Value::from(variable.time_millis()));
    msg
}

// ============================================================================
// Helpers
// ============================================================================

/// Strips leading whitespace and `$` and trailing whitespace.
///
/// `" $temperature "` becomes `"temperature"`.
#[must_use]
pub fn normalize_variable_name(name: &str) -> String {
    name.trim_start_matches(|c: char| c.is_whitespace() || c == '$')
        .trim_end()
        .to_string()
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    epoch_millis(SystemTime::now())
}

/// Trimmed text, or `None` if missing or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Loose truthiness of flow message fields: null, false, zero and the
/// empty string count as absent.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// Registration
// ============================================================================

/// A node's subscription; deregisters on drop.
pub(crate) struct Registration {
    controller: Controller,
    name: String,
    subscriber: Subscriber,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl Registration {
    /// Subscribes to `name` on `controller`.
    pub(crate) fn new(controller: &Controller, name: &str) -> Self {
        let (subscriber, notifications) = Subscriber::channel();
        controller.register_variable(name, &subscriber);
        Self {
            controller: controller.clone(),
            name: name.to_string(),
            subscriber,
            notifications,
        }
    }

    pub(crate) fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Next notification if one is queued.
    pub(crate) fn try_next(&mut self) -> Option<Notification> {
        self.notifications.try_recv().ok()
    }

    /// Waits for the next notification.
    pub(crate) async fn next(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        debug!(name = %self.name, subscriber = %self.subscriber.id(), "Node closing");
        self.controller
            .deregister_variable(&self.name, &self.subscriber);
    }
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
