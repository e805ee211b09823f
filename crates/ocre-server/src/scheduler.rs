use std::time::Instant;

use indexmap::IndexMap;

use tracing::trace;

use ocre::interface::Interface;

use crate::registry::ResourceId;

/// A deferred engine action bound to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Remove the resource and tear down its registrations.
    DeleteResource,
    /// Push a change notification to the resource's observers.
    NotifyChanged,
    /// Push a defaults notification through the given interface.
    NotifyDefaults(Interface),
    /// Poll a periodically observed resource.
    Poll,
}

/// The engine's timer queue.
///
/// One slot per (resource, event) pair: scheduling an event that is
/// already queued moves its deadline instead of queueing it twice.
/// Entries are keyed by generation-checked handles, so an event scheduled
/// against a since-deleted resource expires harmlessly.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: IndexMap<(ResourceId, EventKind), Instant>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Queues an event, replacing any earlier deadline for the same pair.
    pub(crate) fn schedule(&mut self, id: ResourceId, kind: EventKind, at: Instant) {
        trace!("scheduled {kind:?} for {id:?}");
        self.queue.insert((id, kind), at);
    }

    // Cancels one queued event. Returns false if it was not queued.
    pub(crate) fn cancel(&mut self, id: ResourceId, kind: EventKind) -> bool {
        self.queue.shift_remove(&(id, kind)).is_some()
    }

    // Cancels everything queued against a resource.
    pub(crate) fn cancel_all(&mut self, id: ResourceId) {
        self.queue.retain(|(queued, _), _| *queued != id);
    }

    /// Checks whether an event is queued for a resource.
    #[must_use]
    pub fn is_scheduled(&self, id: ResourceId, kind: EventKind) -> bool {
        self.queue.contains_key(&(id, kind))
    }

    /// Returns the earliest queued deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.values().min().copied()
    }

    // Drains every event due at `now`, in deadline order.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<(ResourceId, EventKind)> {
        let mut due: Vec<((ResourceId, EventKind), Instant)> = Vec::new();
        self.queue.retain(|key, at| {
            if *at <= now {
                due.push((*key, *at));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(key, _)| key).collect()
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Checks whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use serde_json::json;

    use crate::registry::Registry;
    use crate::resource::{Reply, Resource};

    use super::{EventKind, Scheduler};

    #[test]
    fn test_due_events_drain_in_deadline_order() {
        let mut registry = Registry::new();
        let a = registry
            .add(Resource::new(0, "/a").on_get(|_| Reply::ok(json!({}))))
            .unwrap();
        let b = registry
            .add(Resource::new(0, "/b").on_get(|_| Reply::ok(json!({}))))
            .unwrap();

        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(b, EventKind::Poll, now + Duration::from_millis(5));
        scheduler.schedule(a, EventKind::NotifyChanged, now);
        scheduler.schedule(a, EventKind::DeleteResource, now + Duration::from_secs(60));

        assert_eq!(scheduler.next_deadline(), Some(now));

        let due = scheduler.take_due(now + Duration::from_millis(10));
        assert_eq!(due, [(a, EventKind::NotifyChanged), (b, EventKind::Poll)]);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_scheduled(a, EventKind::DeleteResource));
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let mut registry = Registry::new();
        let id = registry
            .add(Resource::new(0, "/a").on_get(|_| Reply::ok(json!({}))))
            .unwrap();

        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(id, EventKind::Poll, now + Duration::from_secs(5));
        scheduler.schedule(id, EventKind::Poll, now);

        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.take_due(now).len(), 1);
    }

    #[test]
    fn test_cancel_all_for_resource() {
        let mut registry = Registry::new();
        let a = registry
            .add(Resource::new(0, "/a").on_get(|_| Reply::ok(json!({}))))
            .unwrap();
        let b = registry
            .add(Resource::new(0, "/b").on_get(|_| Reply::ok(json!({}))))
            .unwrap();

        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(a, EventKind::Poll, now);
        scheduler.schedule(a, EventKind::NotifyChanged, now);
        scheduler.schedule(b, EventKind::Poll, now);

        scheduler.cancel_all(a);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_scheduled(b, EventKind::Poll));
        assert!(!scheduler.cancel(a, EventKind::Poll));
    }
}
