//! Builder pattern for controller configuration.
//!
//! Provides a fluent API for configuring and creating [`Controller`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use pimatic_bridge::Controller;
//!
//! # fn example() -> pimatic_bridge::Result<()> {
//! let controller = Controller::builder()
//!     .host("pi.local")
//!     .port(8080)
//!     .credentials("admin", "secret")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{ReconnectPolicy, SocketIoTransport, Transport};

use super::config::{ControllerConfig, validate_protocol};
use super::core::Controller;

// ============================================================================
// ControllerBuilder
// ============================================================================

/// Builder for configuring a [`Controller`] instance.
///
/// Use [`Controller::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ControllerBuilder {
    /// Endpoint settings.
    config: ControllerConfig,
    /// Transport reconnection policy.
    policy: ReconnectPolicy,
    /// Transport; socket.io when unset.
    transport: Option<Arc<dyn Transport>>,
}

// ============================================================================
// ControllerBuilder Implementation
// ============================================================================

impl ControllerBuilder {
    /// Creates a builder for `http://localhost`.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all endpoint settings.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the protocol, `http` or `https`.
    #[inline]
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocol = Some(protocol.into());
        self
    }

    /// Sets the server host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = Some(host.into());
        self
    }

    /// Sets the server port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Sets the path pimatic is served under.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = Some(path.into());
        self
    }

    /// Sets the login credentials.
    #[inline]
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Uses `transport` instead of socket.io over WebSocket.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Builds the controller with validation.
    ///
    /// No connection is made until the first subscription.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the protocol or reconnection policy is invalid
    /// - [`Error::Url`] if the settings do not form a valid URL
    pub fn build(self) -> Result<Controller> {
        validate_protocol(&self.config)?;
        self.validate_policy()?;
        let endpoint = self.config.connector_url()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(SocketIoTransport::new()));

        Ok(Controller::new(endpoint, self.policy, transport))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ControllerBuilder {
    /// Validates the reconnection policy.
    fn validate_policy(&self) -> Result<()> {
        let policy = &self.policy;

        if policy.initial_delay > policy.max_delay {
            return Err(Error::config(format!(
                "Reconnect initial delay ({:?}) exceeds max delay ({:?}).",
                policy.initial_delay, policy.max_delay
            )));
        }

        if policy.connect_timeout == Duration::ZERO {
            return Err(Error::config("Connect timeout must be greater than zero."));
        }

        Ok(())
    }
}

impl fmt::Debug for ControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerBuilder")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
