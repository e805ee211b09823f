use std::net::SocketAddr;

use indexmap::{IndexMap, IndexSet};

use tracing::debug;

use ocre::content::ContentFormat;
use ocre::interface::Interface;

use crate::endpoint::Endpoint;
use crate::message::{CoapResponse, Token};
use crate::registry::ResourceId;

/// Observe option value registering an observer.
pub const OBSERVE_REGISTER: u32 = 0;

/// Observe option value cancelling a registration.
pub const OBSERVE_UNREGISTER: u32 = 1;

/// The identity of an observer registration: observer address plus the
/// token it registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverKey {
    /// Observer address.
    pub address: SocketAddr,
    /// Registration token.
    pub token: Token,
}

/// A live observer registration.
#[derive(Debug, Clone)]
pub struct ObserverEntry {
    /// The observed resource.
    pub resource: ResourceId,
    /// Where notifications are sent.
    pub endpoint: Endpoint,
    /// The interface the observer registered through.
    pub interface: Interface,
    /// The response format the observer asked for.
    pub accept: ContentFormat,
    /// Block size negotiated at registration, reused for notifications.
    pub block2_size: Option<u16>,
}

/// The observer table of an engine, plus the set of periodically polled
/// resources.
#[derive(Debug, Default)]
pub struct Observers {
    entries: IndexMap<ObserverKey, ObserverEntry>,
    poll: IndexSet<ResourceId>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Inserts or refreshes a registration, returning the entry it
    // replaced. Re-registering under the same key never duplicates.
    pub(crate) fn add(&mut self, key: ObserverKey, entry: ObserverEntry) -> Option<ObserverEntry> {
        debug!("observer registered for {:?}", entry.resource);
        self.entries.insert(key, entry)
    }

    // Removes one registration.
    pub(crate) fn remove_by_key(&mut self, key: &ObserverKey) -> Option<ObserverEntry> {
        self.entries.shift_remove(key)
    }

    // Removes every registration watching a resource, returning how many
    // were dropped.
    pub(crate) fn remove_by_resource(&mut self, id: ResourceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.resource != id);
        before - self.entries.len()
    }

    // Iterates over the registrations watching a resource.
    pub(crate) fn for_resource(
        &self,
        id: ResourceId,
    ) -> impl Iterator<Item = (&ObserverKey, &ObserverEntry)> {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.resource == id)
    }

    /// Returns the number of registrations watching a resource.
    #[must_use]
    pub fn count_for(&self, id: ResourceId) -> usize {
        self.for_resource(id).count()
    }

    /// Returns the total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Adds a resource to the periodic poll set. Returns false if it was
    // already polled.
    pub(crate) fn add_poll(&mut self, id: ResourceId) -> bool {
        self.poll.insert(id)
    }

    pub(crate) fn remove_poll(&mut self, id: ResourceId) -> bool {
        self.poll.shift_remove(&id)
    }

    /// Checks whether a resource is in the periodic poll set.
    #[must_use]
    pub fn is_polled(&self, id: ResourceId) -> bool {
        self.poll.contains(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.poll.clear();
    }
}

/// A notification ready to be pushed to one observer.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Where to send it.
    pub endpoint: Endpoint,
    /// The token the observer registered under.
    pub token: Token,
    /// The composed notification response, observe sequence included.
    pub response: CoapResponse,
}

/// Receives composed notifications for delivery.
pub trait NotifySink: Send {
    /// Delivers one notification.
    fn notify(&mut self, notification: Notification);
}

/// A [`NotifySink`] that discards notifications.
///
/// The default until a transport collaborator is attached.
#[derive(Debug, Default)]
pub struct NullNotifySink;

impl NotifySink for NullNotifySink {
    fn notify(&mut self, _notification: Notification) {}
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ocre::content::ContentFormat;
    use ocre::interface::Interface;

    use crate::endpoint::tests::unicast;
    use crate::message::Token;
    use crate::registry::Registry;
    use crate::resource::{Reply, Resource};

    use super::{ObserverEntry, ObserverKey, Observers};

    #[test]
    fn test_register_replace_and_teardown() {
        let mut registry = Registry::new();
        let id = registry
            .add(Resource::new(0, "/light").on_get(|_| Reply::ok(json!({}))))
            .unwrap();
        let endpoint = unicast();
        let key = ObserverKey {
            address: endpoint.address(),
            token: Token::from(9),
        };
        let entry = ObserverEntry {
            resource: id,
            endpoint,
            interface: Interface::Baseline,
            accept: ContentFormat::Undefined,
            block2_size: None,
        };

        let mut observers = Observers::new();
        assert!(observers.add(key.clone(), entry.clone()).is_none());
        // Same key again refreshes instead of duplicating.
        assert!(observers.add(key.clone(), entry).is_some());
        assert_eq!(observers.count_for(id), 1);

        assert_eq!(observers.remove_by_resource(id), 1);
        assert!(observers.is_empty());
        assert!(observers.remove_by_key(&key).is_none());
    }

    #[test]
    fn test_poll_set() {
        let mut registry = Registry::new();
        let id = registry
            .add(Resource::new(0, "/temp").on_get(|_| Reply::ok(json!({}))))
            .unwrap();

        let mut observers = Observers::new();
        assert!(observers.add_poll(id));
        assert!(!observers.add_poll(id));
        assert!(observers.is_polled(id));
        assert!(observers.remove_poll(id));
        assert!(!observers.is_polled(id));
    }
}
