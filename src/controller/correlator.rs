//! Call correlation table.
//!
//! pimatic answers a `call` with a `callResult` carrying the same id, on the
//! same event stream as everything else. The table maps each outstanding
//! id to the one-shot channel its caller waits on.
//!
//! Every entry leaves the table exactly once, by whichever comes first:
//!
//! | Path | Caller sees |
//! |------|-------------|
//! | [`settle`](CallCorrelator::settle) | Result value or [`Error::CallFailed`] |
//! | [`fail`](CallCorrelator::fail), [`fail_all`](CallCorrelator::fail_all) | The supplied error |
//! | [`cancel`](CallCorrelator::cancel), [`clear`](CallCorrelator::clear) | [`Error::ConnectionClosed`] |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CallId;
use crate::protocol::{Action, CallResult};

// ============================================================================
// Types
// ============================================================================

/// Receiving end of a call's outcome.
pub type CallReceiver = oneshot::Receiver<Result<Value>>;

/// One outstanding call.
#[derive(Debug)]
struct PendingCall {
    action: Action,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

// ============================================================================
// CallCorrelator
// ============================================================================

/// Outstanding calls by id.
#[derive(Debug, Default)]
pub struct CallCorrelator {
    pending: FxHashMap<CallId, PendingCall>,
}

impl CallCorrelator {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a call and returns the channel its outcome arrives on.
    pub fn register(&mut self, id: CallId, action: Action) -> CallReceiver {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                action,
                created_at: Instant::now(),
                tx,
            },
        );
        rx
    }

    /// Settles the call a reply belongs to.
    ///
    /// Returns `false` and leaves the table untouched if no call has the
    /// reply's id.
    pub fn settle(&mut self, result: CallResult) -> bool {
        let Some(call) = self.pending.remove(&result.id) else {
            trace!(id = %result.id, "Reply for unknown call");
            return false;
        };

        let outcome = result.into_outcome(call.action);
        debug!(
            action = %call.action,
            success = outcome.is_ok(),
            elapsed_ms = call.created_at.elapsed().as_millis(),
            "Call settled"
        );
        let _ = call.tx.send(outcome);
        true
    }

    /// Fails every outstanding call. Returns how many were failed.
    pub fn fail_all(&mut self, error: impl Fn(Action) -> Error) -> usize {
        let count = self.pending.len();
        for (_, call) in self.pending.drain() {
            let _ = call.tx.send(Err(error(call.action)));
        }
        if count > 0 {
            debug!(count, "Failed pending calls");
        }
        count
    }

    /// Fails one call. Returns `false` if no call has that id.
    pub fn fail(&mut self, id: CallId, error: impl FnOnce(Action) -> Error) -> bool {
        let Some(call) = self.pending.remove(&id) else {
            return false;
        };
        let _ = call.tx.send(Err(error(call.action)));
        true
    }

    /// Drops one call without settling it.
    pub fn cancel(&mut self, id: CallId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drops every call without settling it. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            debug!(count, "Dropped pending calls");
        }
        count
    }

    /// Number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Waits for a registered call's outcome.
///
/// # Errors
///
/// Returns the call's error, or [`Error::ConnectionClosed`] if the entry
/// was dropped without being settled.
pub async fn await_outcome(rx: CallReceiver) -> Result<Value> {
    rx.await.map_err(|_| Error::ConnectionClosed)?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn reply(id: CallId, payload: Value) -> CallResult {
        let mut payload = payload;
        payload["id"] = json!(id);
        serde_json::from_value(payload).expect("valid reply")
    }

    #[test]
    fn test_settle_success() {
        let mut correlator = CallCorrelator::new();
        let id = CallId::generate();
        let mut outcome = task::spawn(await_outcome(
            correlator.register(id, Action::GetVariableByName),
        ));
        assert_pending!(outcome.poll());

        assert!(correlator.settle(reply(id, json!({"success": true, "result": {"ok": 1}}))));
        assert!(outcome.is_woken());
        let value = assert_ready!(outcome.poll()).expect("success");
        assert_eq!(value, json!({"ok": 1}));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_settle_failure_without_error() {
        let mut correlator = CallCorrelator::new();
        let id = CallId::generate();
        let mut outcome = task::spawn(await_outcome(
            correlator.register(id, Action::ExecuteAction),
        ));

        correlator.settle(reply(id, json!({"success": false})));
        let err = assert_ready!(outcome.poll()).expect_err("failure");
        assert_eq!(
            err.to_string(),
            "executeAction failed: unknown error (check pimatic server log)"
        );
    }

    #[test]
    fn test_unknown_reply_is_ignored() {
        let mut correlator = CallCorrelator::new();
        let id = CallId::generate();
        let mut outcome = task::spawn(await_outcome(
            correlator.register(id, Action::GetVariableByName),
        ));

        assert!(!correlator.settle(reply(CallId::generate(), json!({"success": true}))));
        assert_pending!(outcome.poll());
        assert_eq!(correlator.pending_count(), 1);
    }

    #[test]
    fn test_settles_only_once() {
        let mut correlator = CallCorrelator::new();
        let id = CallId::generate();
        let _rx = correlator.register(id, Action::GetVariableByName);

        assert!(correlator.settle(reply(id, json!({"success": true}))));
        assert!(!correlator.settle(reply(id, json!({"success": false}))));
        assert_eq!(correlator.fail_all(|_| Error::ConnectionClosed), 0);
    }

    #[test]
    fn test_fail_all() {
        let mut correlator = CallCorrelator::new();
        let mut first = task::spawn(await_outcome(
            correlator.register(CallId::generate(), Action::UpdateVariable),
        ));
        let mut second = task::spawn(await_outcome(
            correlator.register(CallId::generate(), Action::CallDeviceAction),
        ));

        let failed = correlator.fail_all(|_| Error::connection("connection error: reset"));
        assert_eq!(failed, 2);
        for outcome in [&mut first, &mut second] {
            let err = assert_ready!(outcome.poll()).expect_err("failed");
            assert_eq!(err.to_string(), "connection error: reset");
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_fail_one() {
        let mut correlator = CallCorrelator::new();
        let id = CallId::generate();
        let mut outcome = task::spawn(await_outcome(
            correlator.register(id, Action::GetVariableByName),
        ));
        let _other = correlator.register(CallId::generate(), Action::ExecuteAction);

        assert!(correlator.fail(id, |action| Error::call_failed(action, "garbled")));
        let err = assert_ready!(outcome.poll()).expect_err("failed");
        assert!(err.is_call_failure());
        assert_eq!(correlator.pending_count(), 1);
    }

    #[test]
    fn test_clear_reports_connection_closed() {
        let mut correlator = CallCorrelator::new();
        let id = CallId::generate();
        let mut outcome = task::spawn(await_outcome(
            correlator.register(id, Action::GetVariableByName),
        ));

        assert_eq!(correlator.clear(), 1);
        let err = assert_ready!(outcome.poll()).expect_err("dropped");
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(!correlator.cancel(id));
    }
}
