//! Subscriber identity and subscription handles.
//!
//! Every listener or watcher attached to a cell gets a [`SubscriberId`]. The
//! cell hands back a [`Subscription`] that removes exactly that listener when
//! [`Subscription::unsubscribe`] is called.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a listener or watcher.
///
/// Removal goes through this id rather than a list position, so unsubscribing
/// during a dispatch never shifts another listener out of place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`, `on` and friends.
///
/// Dropping the handle keeps the listener attached. Call
/// [`unsubscribe`](Self::unsubscribe) to detach it.
#[must_use = "dropping a Subscription keeps the listener attached; call unsubscribe() to detach"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A handle that detaches nothing.
    ///
    /// Returned when subscribing to a cell that was already cleaned up.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    /// Whether this handle still has a listener to detach.
    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    /// Detach the listener.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    /// Fold several handles into one.
    pub fn merge(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || {
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
