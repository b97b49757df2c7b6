//! In-process topic-keyed publish/subscribe
//!
//! Decouples state-change producers (devices, the manager) from consumers
//! (notification, persistence triggers, UI refresh). The bus is an
//! explicitly constructed dependency: callers create one and pass it around,
//! there is no process-global instance.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;

use crate::event::Event;

/// A subscriber callback, invoked synchronously on publish
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Topic-keyed publish/subscribe bus.
///
/// Delivery is synchronous and in subscription order within a topic. A
/// handler that panics is isolated and logged; the remaining handlers for
/// the same publish call still run. There is no replay and no ordering
/// guarantee across topics.
pub struct EventBus {
    subscribers: DashMap<String, Vec<Handler>>,
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Register a handler for a topic
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers
            .entry(topic.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Publish an event to every subscriber currently registered on `topic`.
    ///
    /// The handler list is snapshotted first, so a slow or re-entrant
    /// handler never holds the subscriber map lock.
    pub fn publish(&self, topic: &str, event: &Event) {
        let handlers: Vec<Handler> = match self.subscribers.get(topic) {
            Some(entry) => entry.clone(),
            None => return,
        };

        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                tracing::error!(
                    "Subscriber for '{}' failed: {}",
                    topic,
                    panic_message(&panic)
                );
            }
        }
    }

    /// Number of handlers registered on a topic
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map_or(0, |entry| entry.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
