use tracing::trace;

use ocre::interface::Interface;
use ocre::method::Method;
use ocre::outcome::{Failure, FailureSet};

use crate::registry::{Registry, ResourceId};

/// The tag of a representation that was never assigned one.
pub const ETAG_UNINITIALIZED: u64 = 0;

/// The engine-wide version-tag source.
///
/// Tags are drawn from a single monotonic counter, so a tag never repeats
/// across resources and a freshly changed representation always carries a
/// tag unseen by any requester.
#[derive(Debug)]
pub(crate) struct TagClock(u64);

impl TagClock {
    pub(crate) const fn new() -> Self {
        Self(ETAG_UNINITIALIZED)
    }

    // Draws the next tag.
    pub(crate) const fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

// Returns the tag the requested view of the resource currently carries.
//
// A batch retrieve aggregates the members, so its tag is the newest member
// tag: the aggregate changes exactly when some member does.
pub(crate) fn current_tag(registry: &Registry, id: ResourceId, iface: Interface) -> u64 {
    let Some(resource) = registry.get(id) else {
        return ETAG_UNINITIALIZED;
    };
    if iface == Interface::Batch && resource.is_collection() {
        return resource
            .link_ids()
            .into_iter()
            .filter_map(|member| registry.get(member))
            .map(crate::resource::Resource::version_tag)
            .max()
            .unwrap_or(ETAG_UNINITIALIZED);
    }
    resource.version_tag()
}

// Applies the conditional-retrieve check. Only a retrieve with a tag can
// short-circuit, and only against an assigned tag.
pub(crate) fn check_conditional(
    method: Method,
    request_tag: Option<u64>,
    current: u64,
) -> FailureSet {
    let Some(request_tag) = request_tag else {
        return FailureSet::new();
    };
    if method == Method::Get && current != ETAG_UNINITIALIZED && request_tag == current {
        trace!("representation unchanged under tag {current}");
        return FailureSet::init(Failure::NotModified);
    }
    FailureSet::new()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ocre::interface::Interface;
    use ocre::method::Method;
    use ocre::outcome::Failure;

    use crate::registry::Registry;
    use crate::resource::{Reply, Resource};

    use super::{ETAG_UNINITIALIZED, TagClock, check_conditional, current_tag};

    #[test]
    fn test_clock_is_monotonic() {
        let mut clock = TagClock::new();
        let first = clock.next();
        let second = clock.next();
        assert!(first > ETAG_UNINITIALIZED);
        assert!(second > first);
    }

    #[test]
    fn test_conditional_only_matches_retrieve() {
        assert!(
            check_conditional(Method::Get, Some(7), 7).contains(Failure::NotModified)
        );
        assert!(check_conditional(Method::Get, Some(7), 8).is_empty());
        assert!(check_conditional(Method::Get, None, 7).is_empty());
        assert!(check_conditional(Method::Put, Some(7), 7).is_empty());
    }

    #[test]
    fn test_uninitialized_tag_never_matches() {
        assert!(
            check_conditional(Method::Get, Some(ETAG_UNINITIALIZED), ETAG_UNINITIALIZED)
                .is_empty()
        );
    }

    #[test]
    fn test_batch_tag_is_newest_member_tag() {
        let mut registry = Registry::new();
        let a = registry
            .add(Resource::new(0, "/a").on_get(|_| Reply::ok(json!({}))))
            .unwrap();
        let b = registry
            .add(Resource::new(0, "/b").on_get(|_| Reply::ok(json!({}))))
            .unwrap();
        let room = registry.add(Resource::new(0, "/room").collection()).unwrap();
        let links = registry.get_mut(room).unwrap().links.as_mut().unwrap();
        links.0.insert(a);
        links.0.insert(b);

        let mut clock = TagClock::new();
        registry.get_mut(a).unwrap().etag = clock.next();
        registry.get_mut(b).unwrap().etag = clock.next();

        assert_eq!(current_tag(&registry, room, Interface::Batch), 2);
        // The non-aggregating views report the collection's own tag.
        assert_eq!(
            current_tag(&registry, room, Interface::Baseline),
            ETAG_UNINITIALIZED
        );
        assert_eq!(current_tag(&registry, a, Interface::Baseline), 1);
    }

    #[test]
    fn test_empty_collection_batch_tag() {
        let mut registry = Registry::new();
        let room = registry.add(Resource::new(0, "/room").collection()).unwrap();
        assert_eq!(
            current_tag(&registry, room, Interface::Batch),
            ETAG_UNINITIALIZED
        );
    }
}
