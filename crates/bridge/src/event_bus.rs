//! Synchronous publish/subscribe fan-out of domain events.
//!
//! The listener list lives behind an `ArcSwap`: dispatch loads a stable
//! snapshot and iterates it lock-free, while subscribe/unsubscribe publish a
//! new list. Listeners run on the publishing thread, in registration order,
//! and may call back into the bridge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use muxdeck_protocol::DomainEvent;
use tokio::sync::mpsc;
use tracing::debug;

type Listener = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

struct BusInner {
    listeners: ArcSwap<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

/// Cheap to clone; all clones share one listener list.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener. It observes only events published after this call.
    pub fn on<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push((id, listener.clone()));
            next
        });
        debug!(
            component = "event_bus",
            event = "event_bus.subscribed",
            listener_id = id,
            listener_count = self.listener_count(),
            "Listener registered"
        );
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Register a listener that forwards every event into an unbounded channel.
    pub fn channel(&self) -> (Subscription, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.on(move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Deliver `event` to every currently registered listener.
    pub fn publish(&self, event: &DomainEvent) {
        let listeners = self.inner.listeners.load();
        for (_, listener) in listeners.iter() {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.load().len()
    }
}

/// Token returned by [`EventBus::on`]. Dropping it does not unsubscribe.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once, and after the bus is gone.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let id = self.id;
        inner.listeners.rcu(|current| {
            current
                .iter()
                .filter(|(listener_id, _)| *listener_id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn disconnected(name: &str) -> DomainEvent {
        DomainEvent::SessionDisconnected {
            session_name: name.to_string(),
        }
    }

    #[test]
    fn delivers_to_all_listeners_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _a = bus.on({
            let seen = seen.clone();
            move |e| seen.lock().unwrap().push(format!("a:{}", e.session_name()))
        });
        let _b = bus.on({
            let seen = seen.clone();
            move |e| seen.lock().unwrap().push(format!("b:{}", e.session_name()))
        });

        bus.publish(&disconnected("s1"));
        assert_eq!(*seen.lock().unwrap(), vec!["a:s1", "b:s1"]);
    }

    #[test]
    fn no_replay_for_late_listeners() {
        let bus = EventBus::new();
        bus.publish(&disconnected("early"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = bus.on({
            let seen = seen.clone();
            move |e| seen.lock().unwrap().push(e.session_name().to_string())
        });
        bus.publish(&disconnected("late"));
        assert_eq!(*seen.lock().unwrap(), vec!["late"]);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let sub = bus.on({
            let count = count.clone();
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.publish(&disconnected("s1"));
        sub.unsubscribe();
        sub.unsubscribe();
        bus.publish(&disconnected("s1"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn listener_may_subscribe_during_dispatch_without_seeing_current_event() {
        let bus = EventBus::new();
        let inner_seen = Arc::new(AtomicU64::new(0));
        let subs = Arc::new(Mutex::new(Vec::new()));

        let _outer = bus.on({
            let bus = bus.clone();
            let inner_seen = inner_seen.clone();
            let subs = subs.clone();
            move |_| {
                let inner_seen = inner_seen.clone();
                let sub = bus.on(move |_| {
                    inner_seen.fetch_add(1, Ordering::SeqCst);
                });
                subs.lock().unwrap().push(sub);
            }
        });

        bus.publish(&disconnected("s1"));
        assert_eq!(inner_seen.load(Ordering::SeqCst), 0);
        bus.publish(&disconnected("s1"));
        assert_eq!(inner_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_forwards_events() {
        let bus = EventBus::new();
        let (sub, mut rx) = bus.channel();
        bus.publish(&disconnected("s1"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_name(), "s1");

        sub.unsubscribe();
        bus.publish(&disconnected("s2"));
        assert!(rx.recv().await.is_none());
    }
}
