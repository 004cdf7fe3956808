//! # Event Bus
//!
//! Synchronous, in-process publish/subscribe.
//!
//! `publish` runs every handler subscribed to the event's name, in
//! subscription order, before returning. A handler that fails (returns an
//! error or panics) is logged and skipped; the remaining handlers and the
//! publisher carry on. Nothing is queued: subscribers that attach after a
//! publish never see it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error, warn};

use super::domain::{DomainEvent, EventName};

type Handler = Arc<dyn Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: u64,
    name: EventName,
    handler: Handler,
}

struct BusInner {
    /// Replaced wholesale on (un)subscribe so a publish iterates a stable snapshot
    handlers: RwLock<Arc<Vec<Registration>>>,
    next_id: AtomicU64,
    events_published: AtomicU64,
}

impl BusInner {
    fn snapshot(&self) -> Arc<Vec<Registration>> {
        let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn replace(&self, f: impl FnOnce(&mut Vec<Registration>)) {
        let mut guard = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.as_ref().clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}

/// Cheap to clone; clones share the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(Arc::new(Vec::new())),
                next_id: AtomicU64::new(1),
                events_published: AtomicU64::new(0),
            }),
        }
    }

    /// Register `handler` for every event named `name`.
    ///
    /// The returned handle must be kept to unsubscribe; dropping it leaves
    /// the handler registered for the lifetime of the bus.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            id,
            name,
            handler: Arc::new(handler),
        };
        self.inner.replace(|handlers| handlers.push(registration));
        debug!(?name, id, "Subscribed");

        Subscription {
            id,
            name,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Dispatch `event` to its subscribers, returning how many were invoked
    pub fn publish(&self, event: DomainEvent) -> usize {
        let name = event.name();
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        // Handlers may (un)subscribe or publish while we iterate
        let snapshot = self.inner.snapshot();
        let mut delivered = 0;

        for registration in snapshot.iter().filter(|r| r.name == name) {
            delivered += 1;
            let handler = &registration.handler;
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(?name, subscription = registration.id, error = %e, "Event handler failed");
                }
                Err(_) => {
                    error!(?name, subscription = registration.id, "Event handler panicked");
                }
            }
        }

        debug!(?name, delivered, "Event published");
        delivered
    }

    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.inner.snapshot().iter().filter(|r| r.name == name).count()
    }

    pub fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[must_use = "dropping a Subscription does not unsubscribe; keep it to call unsubscribe()"]
pub struct Subscription {
    id: u64,
    name: EventName,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn name(&self) -> EventName {
        self.name
    }

    /// Remove the handler. Takes effect for the next publish; a dispatch
    /// already iterating its snapshot still reaches this handler.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            let id = self.id;
            bus.replace(|handlers| handlers.retain(|r| r.id != id));
            debug!(name = ?self.name, id, "Unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Category;
    use std::sync::Mutex;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = recorder();

        let l1 = Arc::clone(&log);
        let _s1 = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            l1.lock().unwrap().push("h1-start".into());
            l1.lock().unwrap().push("h1-end".into());
            Ok(())
        });
        let l2 = Arc::clone(&log);
        let _s2 = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            l2.lock().unwrap().push("h2".into());
            Ok(())
        });

        assert_eq!(bus.publish(DomainEvent::StatsRefreshNeeded), 2);
        assert_eq!(*log.lock().unwrap(), vec!["h1-start", "h1-end", "h2"]);
    }

    #[test]
    fn test_only_matching_names_are_dispatched() {
        let bus = EventBus::new();
        let log = recorder();
        let l = Arc::clone(&log);
        let _s = bus.subscribe(EventName::DataChanged, move |event| {
            if let DomainEvent::DataChanged(category) = event {
                l.lock().unwrap().push(category.to_string());
            }
            Ok(())
        });

        assert_eq!(bus.publish(DomainEvent::StatsRefreshNeeded), 0);
        assert_eq!(bus.publish(DomainEvent::DataChanged(Category::Medecins)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["medecins"]);
        assert_eq!(bus.events_published(), 2);
    }

    #[test]
    fn test_failing_handlers_do_not_stop_dispatch() {
        let bus = EventBus::new();
        let log = recorder();

        let _s1 = bus.subscribe(EventName::StatsRefreshNeeded, |_| Err(anyhow::anyhow!("boom")));
        let _s2 = bus.subscribe(EventName::StatsRefreshNeeded, |_| panic!("handler panic"));
        let l = Arc::clone(&log);
        let _s3 = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            l.lock().unwrap().push("reached".into());
            Ok(())
        });

        assert_eq!(bus.publish(DomainEvent::StatsRefreshNeeded), 3);
        assert_eq!(*log.lock().unwrap(), vec!["reached"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let log = recorder();
        let l = Arc::clone(&log);
        let sub = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            l.lock().unwrap().push("x".into());
            Ok(())
        });
        assert_eq!(bus.subscriber_count(EventName::StatsRefreshNeeded), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(EventName::StatsRefreshNeeded), 0);
        assert_eq!(bus.publish(DomainEvent::StatsRefreshNeeded), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe_during_dispatch_keeps_current_pass() {
        let bus = EventBus::new();
        let log = recorder();
        let pending: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let p = Arc::clone(&pending);
        let _first = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            if let Some(sub) = p.lock().unwrap().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        let l = Arc::clone(&log);
        let second = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            l.lock().unwrap().push("second".into());
            Ok(())
        });
        *pending.lock().unwrap() = Some(second);

        // Current pass still reaches the handler removed mid-dispatch
        assert_eq!(bus.publish(DomainEvent::StatsRefreshNeeded), 2);
        assert_eq!(bus.publish(DomainEvent::StatsRefreshNeeded), 1);
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_late_subscribers_miss_earlier_events() {
        let bus = EventBus::new();
        bus.publish(DomainEvent::StatsRefreshNeeded);
        let log = recorder();
        let l = Arc::clone(&log);
        let _s = bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            l.lock().unwrap().push("late".into());
            Ok(())
        });
        assert!(log.lock().unwrap().is_empty());
    }
}
