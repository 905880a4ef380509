//! Controller and its building blocks.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Controller`]: connection manager and action invoker |
//! | `builder` | [`ControllerBuilder`] |
//! | `config` | [`ControllerConfig`] and endpoint URL |
//! | `cache` | [`VariableCache`] |
//! | `registry` | [`SubscriptionRegistry`] |
//! | `correlator` | [`CallCorrelator`] |
//! | `subscriber` | [`Subscriber`] handles and [`Notification`]s |

// ============================================================================
// Submodules
// ============================================================================

/// Controller builder.
pub mod builder;

/// Variable cache.
pub mod cache;

/// Endpoint configuration.
pub mod config;

/// Call correlation table.
pub mod correlator;

/// Connection manager and remote calls.
pub mod core;

/// Subscription registry.
pub mod registry;

/// Subscriber handles.
pub mod subscriber;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ControllerBuilder;
pub use cache::VariableCache;
pub use config::ControllerConfig;
pub use correlator::CallCorrelator;
pub use core::{ConnectionState, Controller};
pub use registry::{ACTION_CHANNEL, SubscriptionRegistry};
pub use subscriber::{Notification, Subscriber};
