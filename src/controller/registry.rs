//! Subscribers by variable name.
//!
//! Each name maps to its subscribers in registration order. A name with no
//! subscribers left is removed, so an empty registry has no entries at all.
//!
//! Delivery goes through per-subscriber channels: a consumer that stopped
//! listening is skipped and never blocks the others.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tracing::trace;

use super::subscriber::{Notification, Subscriber};

// ============================================================================
// Constants
// ============================================================================

/// Pseudo-variable for consumers that only invoke actions.
///
/// Subscribing to it keeps the connection alive; it is never reported as
/// not found.
pub const ACTION_CHANNEL: &str = "#action";

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Ordered subscriber lists by name.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: FxHashMap<String, Vec<Subscriber>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `subscriber` to the list for `name`.
    ///
    /// Subscribing the same handle twice registers it twice.
    pub fn subscribe(&mut self, name: &str, subscriber: Subscriber) {
        self.entries
            .entry(name.to_string())
            .or_default()
            .push(subscriber);
    }

    /// Removes every registration of `subscriber` under `name`.
    ///
    /// Returns `true` if anything was removed.
    pub fn unsubscribe(&mut self, name: &str, subscriber: &Subscriber) -> bool {
        let Some(list) = self.entries.get_mut(name) else {
            return false;
        };

        let before = list.len();
        list.retain(|s| s != subscriber);
        let removed = list.len() != before;

        if list.is_empty() {
            self.entries.remove(name);
        }
        removed
    }

    /// Removes every registration. Returns how many were removed.
    pub fn unsubscribe_all(&mut self) -> usize {
        let count = self.subscriber_count();
        self.entries.clear();
        count
    }

    /// Returns the subscribers of `name` in registration order.
    #[must_use]
    pub fn subscribers(&self, name: &str) -> &[Subscriber] {
        self.entries
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Delivers to every subscriber of `name`. Returns the delivered count.
    pub fn notify(&self, name: &str, notification: &Notification) -> usize {
        deliver_all(self.subscribers(name), notification)
    }

    /// Delivers to every subscriber of every name.
    ///
    /// A handle registered under several names is notified once per name.
    pub fn broadcast(&self, notification: &Notification) -> usize {
        self.entries
            .values()
            .map(|list| deliver_all(list, notification))
            .sum()
    }

    /// Names with at least one subscriber.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns `true` if `name` has subscribers.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registrations across all names.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if nobody is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Delivers to each subscriber in order, skipping closed receivers.
fn deliver_all(subscribers: &[Subscriber], notification: &Notification) -> usize {
    subscribers
        .iter()
        .filter(|subscriber| {
            let delivered = subscriber.deliver(notification.clone());
            if !delivered {
                trace!(subscriber = %subscriber.id(), kind = notification.kind(), "Subscriber receiver dropped");
            }
            delivered
        })
        .count()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut registry = SubscriptionRegistry::new();
        let (a, _rx) = Subscriber::channel();

        registry.subscribe("temp", a.clone());
        assert!(registry.contains("temp"));
        assert!(registry.unsubscribe("temp", &a));
        assert!(registry.is_empty());
        assert!(!registry.unsubscribe("temp", &a));
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handle() {
        let mut registry = SubscriptionRegistry::new();
        let (a, _rx_a) = Subscriber::channel();
        let (b, _rx_b) = Subscriber::channel();

        registry.subscribe("temp", a.clone());
        registry.subscribe("temp", b.clone());
        registry.unsubscribe("temp", &a);

        assert_eq!(registry.subscribers("temp"), &[b]);
    }

    #[test]
    fn test_notify_preserves_order_and_skips_closed() {
        let mut registry = SubscriptionRegistry::new();
        let (a, mut rx_a) = Subscriber::channel();
        let (b, rx_b) = Subscriber::channel();
        let (c, mut rx_c) = Subscriber::channel();
        drop(rx_b);

        registry.subscribe("temp", a);
        registry.subscribe("temp", b);
        registry.subscribe("temp", c);

        let delivered = registry.notify("temp", &Notification::NotFound("temp".into()));
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn test_duplicate_subscription_notifies_twice() {
        let mut registry = SubscriptionRegistry::new();
        let (a, mut rx) = Subscriber::channel();

        registry.subscribe("temp", a.clone());
        registry.subscribe("temp", a);
        registry.notify("temp", &Notification::Connected);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_reaches_every_name() {
        let mut registry = SubscriptionRegistry::new();
        let (a, mut rx) = Subscriber::channel();

        registry.subscribe("temp", a.clone());
        registry.subscribe(ACTION_CHANNEL, a);

        assert_eq!(registry.broadcast(&Notification::Connected), 2);
        assert_eq!(rx.try_recv().expect("first"), Notification::Connected);
        assert_eq!(rx.try_recv().expect("second"), Notification::Connected);
    }

    #[test]
    fn test_unsubscribe_all() {
        let mut registry = SubscriptionRegistry::new();
        let (a, _rx) = Subscriber::channel();
        registry.subscribe("x", a.clone());
        registry.subscribe("y", a);

        assert_eq!(registry.subscriber_count(), 2);
        assert_eq!(registry.unsubscribe_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.names().count(), 0);
    }
}
