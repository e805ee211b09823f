use ocre::content::ContentFormat;
use ocre::interface::Interface;

use crate::endpoint::Endpoint;
use crate::message::CoapRequest;
use crate::registry::{Registry, ResourceId};
use crate::resource::normalize_path;

/// The immutable pre-parsed form of an incoming request.
///
/// Built once per message, consumed by the validation gate and the
/// dispatch pipeline, and discarded when the response is composed. It is
/// a pure function of the decoded message and the current registry: no
/// persistent state is touched while preparing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparsedRequest {
    /// Normalized request path.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Content format of the request payload.
    pub content_format: ContentFormat,
    /// Requested response format.
    pub accept: ContentFormat,
    /// Interface selected through the `if=` query parameter.
    pub iface_query: Option<Interface>,
    /// The resource matched by the path, if any.
    pub resource: Option<ResourceId>,
    /// Whether the matched resource is a collection.
    pub is_collection: bool,
}

impl PreparsedRequest {
    /// Pre-parses a decoded request against the current registry.
    #[must_use]
    pub fn prepare(registry: &Registry, request: &CoapRequest, endpoint: &Endpoint) -> Self {
        let query = request.query.clone();
        let iface_query = query
            .as_deref()
            .and_then(|query| query_value(query, "if"))
            .and_then(Interface::from_name);

        let path = normalize_path(request.path.clone());
        let resource = registry.lookup_by_uri(&path, endpoint.device_index());
        let is_collection = resource
            .and_then(|id| registry.get(id))
            .is_some_and(crate::resource::Resource::is_collection);

        Self {
            path,
            query,
            content_format: request.content_format,
            accept: request.accept,
            iface_query,
            resource,
            is_collection,
        }
    }

    /// Returns the interface the request effectively selected.
    ///
    /// Falls back to the matched resource's default interface when the
    /// query carried no selector.
    #[must_use]
    pub fn effective_interface(&self, registry: &Registry) -> Interface {
        self.iface_query.unwrap_or_else(|| {
            self.resource
                .and_then(|id| registry.get(id))
                .map_or(Interface::Baseline, |resource| resource.default_iface())
        })
    }
}

// Returns the first value of a query parameter.
pub(crate) fn query_value<'a>(query: &'a str, key: &'a str) -> Option<&'a str> {
    query_values(query, key).next()
}

// Iterates over every value of a possibly repeated query parameter.
pub(crate) fn query_values<'a>(
    query: &'a str,
    key: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    query.split('&').filter_map(move |pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key).then_some(value)
    })
}

/// Applies the multicast device-id filter.
///
/// A request without a query or without a `di` key targets every device.
/// Otherwise at least one of the `di` values must equal the device id; a
/// device without a configured id never matches an explicit filter.
pub(crate) fn device_id_matches(query: Option<&str>, device_id: Option<&str>) -> bool {
    let Some(query) = query else {
        return true;
    };
    let mut values = query_values(query, "di").peekable();
    if values.peek().is_none() {
        return true;
    }
    let Some(device_id) = device_id else {
        return false;
    };
    values.any(|value| value == device_id)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ocre::interface::Interface;

    use crate::endpoint::tests::unicast;
    use crate::message::CoapRequest;
    use crate::registry::Registry;
    use crate::resource::{Reply, Resource};

    use super::{PreparsedRequest, device_id_matches, query_value};

    const DEVICE_ID: &str = "11111111-2222-3333-4444-555555555555";

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .add(
                Resource::new(0, "/light")
                    .default_interface(Interface::ReadWrite)
                    .on_get(|_| Reply::ok(json!({"on": false}))),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_query_values() {
        assert_eq!(query_value("if=oic.if.rw&x=1", "if"), Some("oic.if.rw"));
        assert_eq!(query_value("x=1", "if"), None);
        assert_eq!(query_value("", "if"), None);
    }

    #[test]
    fn test_prepare_resolves_resource_and_interface() {
        let registry = registry();
        let request = CoapRequest::get("light").query("if=oic.if.baseline");
        let preparsed = PreparsedRequest::prepare(&registry, &request, &unicast());

        assert_eq!(preparsed.path, "/light");
        assert!(preparsed.resource.is_some());
        assert_eq!(preparsed.iface_query, Some(Interface::Baseline));
        assert_eq!(
            preparsed.effective_interface(&registry),
            Interface::Baseline
        );
    }

    #[test]
    fn test_prepare_falls_back_to_default_interface() {
        let registry = registry();
        let request = CoapRequest::get("/light");
        let preparsed = PreparsedRequest::prepare(&registry, &request, &unicast());

        assert_eq!(preparsed.iface_query, None);
        assert_eq!(
            preparsed.effective_interface(&registry),
            Interface::ReadWrite
        );
    }

    #[test]
    fn test_prepare_unknown_path() {
        let registry = registry();
        let request = CoapRequest::get("/nope");
        let preparsed = PreparsedRequest::prepare(&registry, &request, &unicast());

        assert_eq!(preparsed.resource, None);
        assert_eq!(
            preparsed.effective_interface(&registry),
            Interface::Baseline
        );
    }

    #[test]
    fn test_device_id_filter() {
        assert!(device_id_matches(None, Some(DEVICE_ID)));
        assert!(device_id_matches(Some("if=oic.if.b"), Some(DEVICE_ID)));
        assert!(device_id_matches(
            Some(&format!("di={DEVICE_ID}")),
            Some(DEVICE_ID)
        ));
        // Repeated keys scan until one matches.
        assert!(device_id_matches(
            Some(&format!("di=other&di={DEVICE_ID}")),
            Some(DEVICE_ID)
        ));
        assert!(!device_id_matches(Some("di=other"), Some(DEVICE_ID)));
        assert!(!device_id_matches(Some("di=other"), None));
    }
}
