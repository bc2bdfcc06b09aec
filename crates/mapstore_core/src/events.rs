//! Typed, synchronous event channels.
//!
//! An [`EventBus`] is created by whoever publishes an event type and handed
//! to interested components at construction. Handlers run on the publishing
//! thread, inside the publisher's unit of work, so a handler's own
//! transactions commit or roll back together with the publisher's.

use crate::error::CoreResult;
use crate::transaction::UnitOfWork;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

type Handler<E> = Arc<dyn Fn(&UnitOfWork, &E) -> CoreResult<()> + Send + Sync>;

struct Registry<E> {
    handlers: RwLock<Vec<(u64, Handler<E>)>>,
    next_id: AtomicU64,
}

/// A channel for events of type `E`.
///
/// Cloning the bus yields another handle to the same channel.
pub struct EventBus<E> {
    registry: Arc<Registry<E>>,
}

impl<E: 'static> EventBus<E> {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a handler. It stays registered until the returned
    /// [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UnitOfWork, &E) -> CoreResult<()> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.write().push((id, Arc::new(handler)));
        let weak: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.handlers.write().retain(|(h, _)| *h != id);
                }
            })),
        }
    }

    /// Delivers `event` to every handler, in subscription order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first handler error.
    pub fn publish(&self, uow: &UnitOfWork, event: &E) -> CoreResult<()> {
        // Handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler<E>> = self
            .registry
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        trace!(uow = %uow.id(), handlers = handlers.len(), "publish");
        handlers.iter().try_for_each(|handler| handler(uow, event))
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers.read().len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.registry.handlers.read().len())
            .finish()
    }
}

/// Keeps an [`EventBus`] handler registered. Unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unsubscribes now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
