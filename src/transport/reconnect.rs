//! Reconnection policy.
//!
//! The defaults match what the pimatic integration always used with
//! socket.io: retry forever, starting after one second and never waiting
//! more than three, with a twenty second connect timeout.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Delay before the first reconnection attempt.
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on the backoff delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(3000);

/// Time allowed for a single connection attempt.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Exponent cap; larger exponents are always clamped by `max_delay` anyway.
const MAX_BACKOFF_EXPONENT: u32 = 16;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff configuration for transport reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 3s.
    pub max_delay: Duration,

    /// Time allowed for one connection attempt. Default: 20s.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before reconnection attempt number `attempt` (zero based).
    ///
    /// `delay = min(initial * 2^attempt, max)`
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(MAX_BACKOFF_EXPONENT));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

// ============================================================================
// Tests
// ============================================================================
