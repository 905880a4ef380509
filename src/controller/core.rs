//! Controller: one shared pimatic connection and everything mirrored over it.
//!
//! A [`Controller`] owns a single transport socket, the variable cache, the
//! subscription registry and the call correlation table. All of it sits
//! behind one lock; transport events are applied by one dispatch task per
//! connection, in delivery order.
//!
//! # Connection Lifecycle
//!
//! | State | Entered when |
//! |-------|--------------|
//! | `Closed` | Initially, when the last subscriber leaves, on [`Controller::close`] |
//! | `Connecting` | First subscriber arrives, or the transport reports an error |
//! | `Ready` | The server delivered its full variable list |
//!
//! # Example
//!
//! ```no_run
//! use pimatic_bridge::{Controller, Notification, Subscriber};
//!
//! # async fn example() -> pimatic_bridge::Result<()> {
//! let controller = Controller::builder().host("pi.local").build()?;
//! let (subscriber, mut notifications) = Subscriber::channel();
//!
//! controller.register_variable("temperature", &subscriber);
//! while let Some(notification) = notifications.recv().await {
//!     if let Notification::ValueChanged(variable) = notification {
//!         println!("{} = {}", variable.name, variable.value);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::CallId;
use crate::protocol::event::{CALL, CALL_RESULT};
use crate::protocol::{
    Action, Call, ExecuteActionParams, GetVariableParams, Inbound, RemoteVariable,
    UpdateVariableParams, device_action_params,
};
use crate::template;
use crate::transport::{ReconnectPolicy, Socket, Transport, TransportEvent};
use crate::variable::Variable;

use super::builder::ControllerBuilder;
use super::cache::VariableCache;
use super::correlator::{CallCorrelator, CallReceiver, await_outcome};
use super::registry::{ACTION_CHANNEL, SubscriptionRegistry};
use super::subscriber::{Notification, Subscriber};

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Closed,
    /// Socket open, full variable list not yet received.
    Connecting,
    /// Cache reflects the server's variable list.
    Ready,
}

// ============================================================================
// Internal State
// ============================================================================

/// The live socket and the generation it belongs to.
struct ActiveSocket {
    socket: Box<dyn Socket>,
    generation: u64,
}

/// Everything guarded by the controller lock.
#[derive(Default)]
struct ControllerState {
    connection: ConnectionState,
    socket: Option<ActiveSocket>,
    /// Incremented for every socket opened.
    generation: u64,
    /// Set by `close`; no socket is opened afterwards.
    closed: bool,
    cache: VariableCache,
    registry: SubscriptionRegistry,
    calls: CallCorrelator,
}

impl ControllerState {
    /// Returns `true` if `generation` is the live socket's.
    fn is_current(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    /// Closes the socket if any and fails calls that can no longer settle.
    fn teardown(&mut self) {
        if let Some(active) = self.socket.take() {
            active.socket.close();
            info!(generation = active.generation, "Connection closed");
        }
        self.connection = ConnectionState::Closed;
        self.calls.clear();
    }
}

struct ControllerInner {
    endpoint: Url,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    state: Mutex<ControllerState>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().socket.take() {
            active.socket.close();
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Shared connection to one pimatic server.
///
/// Cheap to clone; clones share the connection. The socket is opened when
/// the first subscriber registers and closed when the last one leaves.
/// Methods that may open a socket must be called within a Tokio runtime.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Creates a controller. No connection is made yet.
    pub(crate) fn new(endpoint: Url, policy: ReconnectPolicy, transport: Arc<dyn Transport>) -> Self {
        debug!(endpoint = %endpoint, "Controller created");
        Self {
            inner: Arc::new(ControllerInner {
                endpoint,
                policy,
                transport,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Returns the server endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

impl Controller {
    /// Registers interest in a variable, or in [`ACTION_CHANNEL`].
    ///
    /// Opens the connection if this is the first subscriber. When the
    /// connection is ready the subscriber is told the current state at
    /// once: the cached variable, or not-found if the server has none.
    ///
    /// Ignored after [`close`](Self::close).
    pub fn register_variable(&self, name: &str, subscriber: &Subscriber) {
        let mut state = self.inner.state.lock();
        if state.closed {
            warn!(name = %name, subscriber = %subscriber.id(), "Controller closed, subscription refused");
            return;
        }

        state.registry.subscribe(name, subscriber.clone());
        debug!(
            name = %name,
            subscriber = %subscriber.id(),
            subscribers = state.registry.subscriber_count(),
            "Variable registered"
        );

        if state.connection == ConnectionState::Ready {
            if let Some(variable) = state.cache.snapshot(name) {
                subscriber.deliver(Notification::ValueChanged(variable));
            } else if name != ACTION_CHANNEL {
                subscriber.deliver(Notification::NotFound(name.to_string()));
            }
        }

        self.ensure_started(&mut state);
    }

    /// Removes every registration of `subscriber` under `name`.
    ///
    /// Closes the connection when nobody is subscribed any more.
    pub fn deregister_variable(&self, name: &str, subscriber: &Subscriber) {
        let mut state = self.inner.state.lock();
        let removed = state.registry.unsubscribe(name, subscriber);
        debug!(name = %name, subscriber = %subscriber.id(), removed, "Variable deregistered");

        if state.registry.is_empty() {
            state.teardown();
        }
    }

    /// Removes every subscription and closes the connection.
    pub fn deregister_all(&self) {
        let mut state = self.inner.state.lock();
        let removed = state.registry.unsubscribe_all();
        debug!(removed, "All variables deregistered");
        state.teardown();
    }

    /// Shuts the controller down for good.
    ///
    /// Drops every subscription, closes the connection and refuses to open
    /// another one. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.closed {
            info!(endpoint = %self.inner.endpoint, "Controller closing");
        }
        state.closed = true;
        state.registry.unsubscribe_all();
        state.teardown();
    }

    /// Opens the connection unless one exists or the controller is closed.
    fn ensure_started(&self, state: &mut ControllerState) {
        if state.closed || state.socket.is_some() {
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        match self
            .inner
            .transport
            .open(&self.inner.endpoint, &self.inner.policy, events_tx)
        {
            Ok(socket) => {
                info!(endpoint = %self.inner.endpoint, generation, "First subscriber, starting connection");
                state.socket = Some(ActiveSocket { socket, generation });
                state.connection = ConnectionState::Connecting;
                tokio::spawn(run_dispatch(
                    Arc::downgrade(&self.inner),
                    generation,
                    events_rx,
                ));
            }
            Err(e) => {
                warn!(error = %e, endpoint = %self.inner.endpoint, "Failed to open connection");
                state.registry.broadcast(&Notification::ConnectionError(format!(
                    "connection error: {e}"
                )));
            }
        }
    }
}

// ============================================================================
// Remote Calls
// ============================================================================

impl Controller {
    /// Calls a remote action and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::SocketNotReady`] at once if there is no connection
    /// - [`Error::CallFailed`] if the server rejected the call
    /// - [`Error::Connection`] if the transport failed before the reply
    /// - [`Error::ConnectionClosed`] if the connection was closed meanwhile
    pub async fn invoke(&self, action: Action, params: Value) -> Result<Value> {
        let rx = self.start_call(action, params)?;
        await_outcome(rx).await
    }

    /// Emits a call and registers it for correlation.
    fn start_call(&self, action: Action, params: Value) -> Result<CallReceiver> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let Some(active) = state.socket.as_ref() else {
            warn!(action = %action, "Call failed: socket not ready");
            return Err(Error::SocketNotReady);
        };

        let call = Call::new(action, params);
        let id: CallId = call.id;
        let payload = serde_json::to_value(&call)?;

        let rx = state.calls.register(id, action);
        if let Err(e) = active.socket.emit(CALL, payload) {
            state.calls.cancel(id);
            return Err(e);
        }

        trace!(id = %id, action = %action, "Call emitted");
        Ok(rx)
    }

    /// Reads a variable from the server and caches the result.
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke); [`Error::Protocol`] if the reply holds
    /// no variable.
    pub async fn get_variable_value(&self, name: &str) -> Result<Variable> {
        let params = serde_json::to_value(GetVariableParams {
            name: name.to_string(),
        })?;
        let result = self.invoke(Action::GetVariableByName, params).await?;
        self.store_reply(result)
    }

    /// Writes a variable and caches the server's answer.
    ///
    /// Readonly variables are not checked here; the server decides.
    ///
    /// # Errors
    ///
    /// See [`get_variable_value`](Self::get_variable_value).
    pub async fn set_variable_value(
        &self,
        name: &str,
        value: Value,
        unit: Option<&str>,
    ) -> Result<Variable> {
        let params = serde_json::to_value(UpdateVariableParams::new(
            name,
            value,
            unit.map(str::to_string),
        ))?;
        let result = self.invoke(Action::UpdateVariable, params).await?;
        self.store_reply(result)
    }

    /// Invokes an action on a device.
    ///
    /// `extra` holds action arguments; its entries win over `deviceId` and
    /// `actionName`.
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke).
    pub async fn execute_device_action(
        &self,
        device_id: &str,
        action_name: &str,
        extra: Map<String, Value>,
    ) -> Result<Value> {
        let params = device_action_params(device_id, action_name, extra);
        self.invoke(Action::CallDeviceAction, params).await
    }

    /// Executes a rule action such as `switch on lamp1`.
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke).
    pub async fn execute_rule_action(&self, action_string: &str) -> Result<Value> {
        let params = serde_json::to_value(ExecuteActionParams {
            action_string: action_string.to_string(),
        })?;
        self.invoke(Action::ExecuteAction, params).await
    }

    /// Expands `${...}` references against `input`, then executes the
    /// resulting rule action.
    ///
    /// # Errors
    ///
    /// [`Error::UnresolvedReference`] without contacting the server if a
    /// reference is missing; otherwise see [`invoke`](Self::invoke).
    pub async fn execute_rule_template(&self, template: &str, input: &Value) -> Result<Value> {
        let action_string = template::expand(template, input)?;
        self.execute_rule_action(&action_string).await
    }

    /// Caches the `variable` record of a call result.
    fn store_reply(&self, result: Value) -> Result<Variable> {
        let record = match result {
            Value::Object(mut map) => map.remove("variable"),
            _ => None,
        }
        .filter(|record| !record.is_null())
        .ok_or_else(|| Error::protocol("call result carries no variable"))?;

        let remote: RemoteVariable = serde_json::from_value(record)?;
        Ok(self.inner.state.lock().cache.upsert(remote))
    }
}

// ============================================================================
// Inspection
// ============================================================================

impl Controller {
    /// Returns the cached state of a variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.inner.state.lock().cache.snapshot(name)
    }

    /// Returns the connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    /// Number of registrations across all names.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().registry.subscriber_count()
    }

    /// Number of calls awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.state.lock().calls.pending_count()
    }

    /// Returns `true` after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Controller")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("connection", &state.connection)
            .field("variables", &state.cache.len())
            .field("subscribers", &state.registry.subscriber_count())
            .field("pending_calls", &state.calls.pending_count())
            .field("closed", &state.closed)
            .finish()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Applies one connection's events until it is replaced or closed.
async fn run_dispatch(
    inner: Weak<ControllerInner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        if !handle_event(&inner, generation, event) {
            break;
        }
    }
    debug!(generation, "Dispatch task terminated");
}

/// Applies one transport event. Returns `false` once the connection is stale.
fn handle_event(inner: &Weak<ControllerInner>, generation: u64, event: TransportEvent) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    let mut state = inner.state.lock();
    if !state.is_current(generation) {
        trace!(generation, "Discarding event from closed connection");
        return false;
    }

    if let Some(inbound) = decode_event(&mut state, event) {
        dispatch(&mut state, inbound);
    }
    true
}

/// Converts a transport event. Undecodable call results fail their call.
fn decode_event(state: &mut ControllerState, event: TransportEvent) -> Option<Inbound> {
    let (name, payload) = match event {
        TransportEvent::Connected => return Some(Inbound::Connected),
        TransportEvent::Error(detail) | TransportEvent::ConnectError(detail) => {
            return Some(Inbound::connection_error(&detail));
        }
        TransportEvent::Event { name, payload } => (name, payload),
    };

    let call_id = (name == CALL_RESULT)
        .then(|| payload.get("id").cloned())
        .flatten()
        .and_then(|id| serde_json::from_value::<CallId>(id).ok());

    match Inbound::decode(&name, payload) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(event = %name, error = %e, "Malformed server event");
            if let Some(id) = call_id {
                state
                    .calls
                    .fail(id, |action| Error::call_failed(action, format!("malformed reply: {e}")));
            }
            None
        }
    }
}

/// Applies a decoded event to cache, registry and correlation table.
fn dispatch(state: &mut ControllerState, inbound: Inbound) {
    trace!(kind = inbound.kind(), "Dispatching");

    match inbound {
        Inbound::Connected => {
            info!("Connected to pimatic");
            state.registry.broadcast(&Notification::Connected);
        }

        Inbound::ConnectionError(message) => {
            warn!(error = %message, "Connection error");
            state.connection = ConnectionState::Connecting;
            state
                .calls
                .fail_all(|_| Error::connection(message.clone()));
            state
                .registry
                .broadcast(&Notification::ConnectionError(message));
        }

        Inbound::FullSync(records) => {
            debug!(count = records.len(), "Variables received");
            state.connection = ConnectionState::Ready;

            for variable in state.cache.sync(records) {
                let name = variable.name.clone();
                state
                    .registry
                    .notify(&name, &Notification::ValueChanged(variable));
            }

            let missing: Vec<String> = state
                .registry
                .names()
                .filter(|name| *name != ACTION_CHANNEL && !state.cache.contains(name))
                .map(str::to_string)
                .collect();
            for name in missing {
                debug!(name = %name, "Subscribed variable not found");
                state
                    .registry
                    .notify(&name, &Notification::NotFound(name.clone()));
            }
        }

        Inbound::Push(remote) => {
            let variable = state.cache.upsert(remote);
            let name = variable.name.clone();
            state
                .registry
                .notify(&name, &Notification::ValueChanged(variable));
        }

        Inbound::Remove { name } => {
            state.cache.remove(&name);
            debug!(name = %name, "Variable removed");
            state
                .registry
                .notify(&name, &Notification::NotFound(name.clone()));
        }

        Inbound::MinimalPush { name, value } => {
            let variable = state.cache.merge_push(&name, value);
            state
                .registry
                .notify(&name, &Notification::ValueChanged(variable));
        }

        Inbound::CallResult(result) => {
            state.calls.settle(result);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
