// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications.
//!
//! Two ways to consume events, usable together:
//! - `subscribe()` callbacks run synchronously inside `emit()`
//! - `poll()` drains a queue of everything emitted since the last poll,
//!   for hosts that prefer to react once per main-loop iteration
//!
//! Callbacks are cloned out of the subscriber list before they run, so a
//! handler may subscribe, unsubscribe or open a suppression scope without
//! deadlocking. Handlers never get a mutable path back into the index while
//! it is emitting; anything that must mutate it goes through `poll()`.

use crate::node::NodeId;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// An event that can travel on an [`EventBus`]
pub trait BusEvent: Clone + Send + Sync + 'static {
    /// Whether an active suppression scope silences this event
    fn is_suppressible(&self) -> bool;
}

/// Notifications emitted by the sequence indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    /// A node was added to the index
    Registered(NodeId),
    /// An indexed node changed (re-parented, new editorial reference...)
    Updated(NodeId),
    /// One or more nodes left the index; re-query it
    Removed,
    /// At least one node's validity flags flipped during a recompute pass
    ValidityChanged,
    /// A full project scan finished
    Initialized,
}

impl BusEvent for IndexEvent {
    fn is_suppressible(&self) -> bool {
        matches!(
            self,
            IndexEvent::Registered(_) | IndexEvent::Updated(_) | IndexEvent::Removed
        )
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Observer list with suppression and a deferred queue
pub struct EventBus<E: BusEvent> {
    subscribers: Arc<RwLock<Vec<(SubscriptionId, Callback<E>)>>>,
    queue: Arc<Mutex<Vec<E>>>,
    suppressed: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            queue: Arc::clone(&self.queue),
            suppressed: Arc::clone(&self.suppressed),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("queued", &self.queue_len())
            .field("suppressed", &self.is_suppressed())
            .finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
            suppressed: Arc::new(AtomicBool::new(false)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a callback for every event. Callbacks run in subscription order
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event. Returns false when it was suppressed
    pub fn emit(&self, event: E) -> bool {
        if event.is_suppressible() && self.is_suppressed() {
            return false;
        }

        let callbacks: Vec<Callback<E>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(&event);
        }

        let mut queue = self.queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            tracing::warn!(
                "Event queue full ({} events), evicting oldest {}",
                queue.len(),
                evict_count
            );
            queue.drain(0..evict_count);
        }
        queue.push(event);
        true
    }

    /// Drain the events emitted since the last poll
    pub fn poll(&self) -> Vec<E> {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Number of queued events
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether a suppression scope is active
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Acquire)
    }

    /// Silence suppressible events until the guard drops.
    ///
    /// The guard restores whatever state was active when it was created, so
    /// scopes nest, and it restores on every exit path including `?` and
    /// unwinding.
    pub fn suppress(&self) -> SuppressionGuard {
        let previous = self.suppressed.swap(true, Ordering::AcqRel);
        SuppressionGuard {
            flag: Arc::clone(&self.suppressed),
            previous,
        }
    }
}

/// Scope guard returned by [`EventBus::suppress`]
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressionGuard {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl fmt::Debug for SuppressionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppressionGuard")
            .field("previous", &self.previous)
            .finish()
    }
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_bus() -> (EventBus<IndexEvent>, Arc<AtomicUsize>) {
        let bus: EventBus<IndexEvent> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (bus, count)
    }

    #[test]
    fn test_subscribers_receive_events() {
        let (bus, count) = counting_bus();
        bus.emit(IndexEvent::Removed);
        bus.emit(IndexEvent::Initialized);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus: EventBus<IndexEvent> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(IndexEvent::Removed);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_suppression_silences_structural_events_only() {
        let (bus, count) = counting_bus();
        {
            let _guard = bus.suppress();
            assert!(!bus.emit(IndexEvent::Registered(NodeId::new())));
            assert!(!bus.emit(IndexEvent::Updated(NodeId::new())));
            assert!(!bus.emit(IndexEvent::Removed));
            assert!(bus.emit(IndexEvent::ValidityChanged));
            assert!(bus.emit(IndexEvent::Initialized));
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(bus.emit(IndexEvent::Removed));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_nested_suppression_restores_outer_state() {
        let bus: EventBus<IndexEvent> = EventBus::new();
        let outer = bus.suppress();
        {
            let _inner = bus.suppress();
            assert!(bus.is_suppressed());
        }
        assert!(bus.is_suppressed());
        drop(outer);
        assert!(!bus.is_suppressed());
    }

    #[test]
    fn test_suppression_restored_on_error_path() {
        fn store_failure() -> Result<(), String> {
            Err("storage went away".to_string())
        }

        fn batch(bus: &EventBus<IndexEvent>) -> Result<(), String> {
            let _guard = bus.suppress();
            bus.emit(IndexEvent::Removed);
            store_failure()?;
            Ok(())
        }

        let (bus, count) = counting_bus();
        assert!(batch(&bus).is_err());
        assert!(!bus.is_suppressed());
        bus.emit(IndexEvent::Removed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_suppression_restored_on_unwind() {
        let bus: EventBus<IndexEvent> = EventBus::new();
        let inner = bus.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.suppress();
            panic!("handler failure");
        }));
        assert!(result.is_err());
        assert!(!bus.is_suppressed());
    }

    #[test]
    fn test_reentrant_subscribe_from_callback() {
        let bus: EventBus<IndexEvent> = EventBus::new();
        let handle = bus.clone();
        bus.subscribe(move |_| {
            handle.subscribe(|_| {});
        });

        bus.emit(IndexEvent::Initialized);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_poll_drains_queue() {
        let bus: EventBus<IndexEvent> = EventBus::new();
        bus.emit(IndexEvent::Removed);
        bus.emit(IndexEvent::ValidityChanged);
        assert_eq!(bus.queue_len(), 2);
        assert_eq!(bus.poll(), vec![IndexEvent::Removed, IndexEvent::ValidityChanged]);
        assert_eq!(bus.queue_len(), 0);
    }

    #[test]
    fn test_queue_eviction() {
        let bus: EventBus<IndexEvent> = EventBus::new();
        for _ in 0..MAX_QUEUE_SIZE + 1 {
            bus.emit(IndexEvent::ValidityChanged);
        }
        assert_eq!(bus.queue_len(), MAX_QUEUE_SIZE / 2 + 1);
    }
}
