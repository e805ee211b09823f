use indexmap::{IndexMap, IndexSet};

use tracing::{debug, error};

use crate::error::{Error, ErrorKind, Result};
use crate::resource::{Resource, normalize_path};

/// A generation-checked handle to a registered [`Resource`].
///
/// Slots are recycled on deletion; the generation guards a stale handle
/// from reaching a slot that now holds a different resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    index: u32,
    generation: u32,
}

// A slab slot. The generation advances every time the slot is vacated.
#[derive(Debug)]
struct Slot {
    generation: u32,
    resource: Option<Resource>,
}

/// The set of live resources of an engine, plus the resources whose
/// deletion is pending.
///
/// Resources are owned by the registry from [`Registry::add`] until
/// deletion. A resource marked pending-delete is excluded from dispatch
/// lookups but still reachable through [`Registry::get`] so observer
/// teardown can complete, and its path still counts as in use.
#[derive(Debug, Default)]
pub struct Registry {
    // Slab storage.
    slots: Vec<Slot>,
    // Recyclable slot indexes.
    free: Vec<u32>,
    // (device, path) -> id for every stored resource.
    by_uri: IndexMap<(usize, String), ResourceId>,
    // Resources scheduled for deletion.
    pending: IndexSet<ResourceId>,
}

impl Registry {
    /// Creates an empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a resource, making it dispatchable.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource declares no method handler and is
    /// not a collection, if it is flagged periodic without a positive poll
    /// period, or if its (device, path) pair is already in use by a live
    /// or delete-pending resource.
    pub fn add(&mut self, resource: Resource) -> Result<ResourceId> {
        if !resource.is_collection() && !resource.has_any_handler() {
            return Err(rejected(&resource, "no method handlers"));
        }
        if resource
            .poll_period()
            .is_some_and(|period| period.is_zero())
        {
            return Err(rejected(&resource, "invalid poll period"));
        }
        if self.uri_in_use(resource.path(), resource.device()) {
            return Err(rejected(&resource, "path already in use"));
        }

        let key = (resource.device(), resource.path().to_owned());
        let id = self.store(resource);
        self.by_uri.insert(key, id);
        debug!("registered resource {:?}", self.get(id).map(Resource::path));
        Ok(id)
    }

    /// Returns the resource behind a handle, delete-pending included.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.resource.as_ref()
    }

    /// Returns a mutable reference to the resource behind a handle.
    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.resource.as_mut()
    }

    /// Looks up a dispatchable resource by path.
    ///
    /// Delete-pending resources are not dispatchable and never returned.
    #[must_use]
    pub fn lookup_by_uri(&self, path: &str, device: usize) -> Option<ResourceId> {
        let path = normalize_path(path.to_owned());
        let id = self.by_uri.get(&(device, path)).copied()?;
        if self.pending.contains(&id) {
            return None;
        }
        Some(id)
    }

    /// Checks whether a path is taken by a live or delete-pending resource.
    #[must_use]
    pub fn uri_in_use(&self, path: &str, device: usize) -> bool {
        let path = normalize_path(path.to_owned());
        self.by_uri.contains_key(&(device, path))
    }

    /// Moves a resource from the live set into the delete-pending set.
    ///
    /// Returns `false` for a stale handle. Marking an already pending
    /// resource again is a no-op.
    pub fn mark_pending_delete(&mut self, id: ResourceId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.pending.insert(id);
        true
    }

    /// Checks whether a resource is scheduled for deletion.
    #[must_use]
    pub fn is_pending_delete(&self, id: ResourceId) -> bool {
        self.pending.contains(&id)
    }

    /// Removes a resource, returning it for teardown.
    ///
    /// A stale or already removed handle yields `None`.
    pub fn remove(&mut self, id: ResourceId) -> Option<Resource> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let resource = slot.resource.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.pending.shift_remove(&id);
        self.by_uri
            .shift_remove(&(resource.device(), resource.path().to_owned()));
        Some(resource)
    }

    /// Iterates over the dispatchable resources, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.by_uri
            .values()
            .filter(|id| !self.pending.contains(*id))
            .filter_map(|id| self.get(*id).map(|resource| (*id, resource)))
    }

    /// Returns every stored handle, delete-pending included.
    #[must_use]
    pub fn all_ids(&self) -> Vec<ResourceId> {
        self.by_uri.values().copied().collect()
    }

    /// Returns the handles of the collections whose links contain `id`.
    #[must_use]
    pub fn collections_linking(&self, id: ResourceId) -> Vec<ResourceId> {
        self.by_uri
            .values()
            .filter(|candidate| {
                self.get(**candidate)
                    .and_then(|resource| resource.links.as_ref())
                    .is_some_and(|links| links.0.contains(&id))
            })
            .copied()
            .collect()
    }

    /// Returns the number of stored resources, delete-pending included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    /// Checks whether no resource is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }

    fn store(&mut self, resource: Resource) -> ResourceId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.resource = Some(resource);
            return ResourceId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            resource: Some(resource),
        });
        ResourceId {
            index,
            generation: 0,
        }
    }
}

fn rejected(resource: &Resource, reason: &'static str) -> Error {
    error!("resource {} rejected: {reason}", resource.path());
    Error::new(ErrorKind::Registry, reason)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::resource::{Reply, Resource};

    use super::Registry;

    fn light() -> Resource {
        Resource::new(0, "/light").on_get(|_| Reply::ok(json!({"on": false})))
    }

    #[test]
    fn test_add_then_lookup_then_delete() {
        let mut registry = Registry::new();
        let id = registry.add(light()).unwrap();

        assert_eq!(registry.lookup_by_uri("/light", 0), Some(id));
        assert_eq!(registry.lookup_by_uri("light", 0), Some(id));
        assert_eq!(registry.lookup_by_uri("/light", 1), None);

        assert!(registry.remove(id).is_some());
        assert_eq!(registry.lookup_by_uri("/light", 0), None);
        assert!(!registry.uri_in_use("/light", 0));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut registry = Registry::new();
        registry.add(light()).unwrap();

        assert!(registry.add(light()).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_path_on_another_device_allowed() {
        let mut registry = Registry::new();
        registry.add(light()).unwrap();

        let other = Resource::new(1, "/light").on_get(|_| Reply::ok(json!({})));
        assert!(registry.add(other).is_ok());
    }

    #[test]
    fn test_no_handlers_rejected() {
        let mut registry = Registry::new();
        assert!(registry.add(Resource::new(0, "/light")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_collections_need_no_handlers() {
        let mut registry = Registry::new();
        assert!(registry.add(Resource::new(0, "/room").collection()).is_ok());
    }

    #[test]
    fn test_zero_poll_period_rejected() {
        let mut registry = Registry::new();
        let resource = Resource::new(0, "/temp")
            .periodic(Duration::ZERO)
            .on_get(|_| Reply::ok(json!({})));
        assert!(registry.add(resource).is_err());
    }

    #[test]
    fn test_pending_delete_blocks_dispatch_but_keeps_path() {
        let mut registry = Registry::new();
        let id = registry.add(light()).unwrap();

        assert!(registry.mark_pending_delete(id));
        assert_eq!(registry.lookup_by_uri("/light", 0), None);
        assert!(registry.uri_in_use("/light", 0));
        assert!(registry.get(id).is_some());
        assert!(registry.add(light()).is_err());
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut registry = Registry::new();
        let id = registry.add(light()).unwrap();
        registry.remove(id);

        let other = Resource::new(0, "/other").on_get(|_| Reply::ok(json!({})));
        let reused = registry.add(other).unwrap();

        assert!(registry.get(id).is_none());
        assert!(registry.get(reused).is_some());
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_collections_linking() {
        let mut registry = Registry::new();
        let member = registry.add(light()).unwrap();
        let collection = registry.add(Resource::new(0, "/room").collection()).unwrap();

        registry
            .get_mut(collection)
            .unwrap()
            .links
            .as_mut()
            .unwrap()
            .0
            .insert(member);

        assert_eq!(registry.collections_linking(member), [collection]);
        assert!(registry.collections_linking(collection).is_empty());
    }
}
