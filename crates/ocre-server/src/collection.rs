use serde_json::{Value, json};

use tracing::warn;

use ocre::interface::Interface;
use ocre::method::Method;
use ocre::status::Status;

use crate::endpoint::Endpoint;
use crate::registry::{Registry, ResourceId};
use crate::resource::{HandlerReply, Reply, Request};

// Builds one link object for a member.
fn link_document(registry: &Registry, member: ResourceId) -> Option<Value> {
    let resource = registry.get(member)?;
    let interfaces: Vec<&str> = resource
        .interfaces()
        .iter()
        .map(Interface::name)
        .collect();
    Some(json!({
        "href": resource.path(),
        "rt": resource.types(),
        "if": interfaces,
        "p": { "bm": if resource.is_observable() { 3 } else { 1 } },
    }))
}

// The linked-list view: a bare array of member links.
pub(crate) fn links_document(registry: &Registry, id: ResourceId) -> Value {
    let members = registry
        .get(id)
        .map(crate::resource::Resource::link_ids)
        .unwrap_or_default();
    Value::Array(
        members
            .into_iter()
            .filter_map(|member| link_document(registry, member))
            .collect(),
    )
}

// The baseline view: the collection's own properties plus its links.
fn baseline_document(registry: &Registry, id: ResourceId) -> Value {
    let Some(resource) = registry.get(id) else {
        return json!({});
    };
    let interfaces: Vec<&str> = resource
        .interfaces()
        .iter()
        .map(Interface::name)
        .collect();
    json!({
        "rt": resource.types(),
        "if": interfaces,
        "links": links_document(registry, id),
    })
}

// Invokes a member's own handler on behalf of the collection.
fn forward(
    registry: &mut Registry,
    member: ResourceId,
    method: Method,
    document: Option<&Value>,
    endpoint: &Endpoint,
) -> Option<Reply> {
    let resource = registry.get_mut(member)?;
    let path = resource.path().to_owned();
    let interface = resource.default_iface();
    let handler = resource.handler_mut(method)?;
    let request = Request {
        method,
        path: &path,
        query: None,
        interface,
        document,
        endpoint,
    };
    match handler(&request) {
        HandlerReply::Reply(reply) => Some(reply),
        // A member reached through its collection cannot defer.
        HandlerReply::Deferred => {
            warn!("member {path} deferred inside a collection request");
            None
        }
    }
}

// The batch view: every member's representation keyed by its path.
fn batch_document(registry: &mut Registry, id: ResourceId, endpoint: &Endpoint) -> Reply {
    let members = registry
        .get(id)
        .map(crate::resource::Resource::link_ids)
        .unwrap_or_default();
    let mut entries = Vec::with_capacity(members.len());
    for member in members {
        let Some(reply) = forward(registry, member, Method::Get, None, endpoint) else {
            continue;
        };
        if reply.status().is_error() {
            continue;
        }
        let Some(href) = registry.get(member).map(|resource| resource.path().to_owned()) else {
            continue;
        };
        entries.push(json!({
            "href": href,
            "rep": reply.payload.unwrap_or(Value::Null),
        }));
    }
    Reply::ok(Value::Array(entries))
}

// A batch update fans the document out to every member. One failing
// member fails the whole update.
fn batch_update(
    registry: &mut Registry,
    id: ResourceId,
    method: Method,
    document: Option<&Value>,
    endpoint: &Endpoint,
) -> Reply {
    let members = registry
        .get(id)
        .map(crate::resource::Resource::link_ids)
        .unwrap_or_default();
    for member in members {
        let Some(reply) = forward(registry, member, method, document, endpoint) else {
            warn!("batch update skipped an unreachable member");
            return Reply::new(Status::BadRequest);
        };
        if reply.status().is_error() {
            return Reply::new(Status::BadRequest);
        }
    }
    Reply::changed()
}

/// Dispatches a request addressed to a collection.
pub(crate) fn dispatch(
    registry: &mut Registry,
    id: ResourceId,
    method: Method,
    iface: Interface,
    document: Option<&Value>,
    endpoint: &Endpoint,
) -> Reply {
    match (method, iface) {
        (Method::Get, Interface::LinkedList) => Reply::ok(links_document(registry, id)),
        (Method::Get, Interface::Batch) => batch_document(registry, id, endpoint),
        (Method::Get, _) => Reply::ok(baseline_document(registry, id)),
        (Method::Put | Method::Post, Interface::Batch) => {
            batch_update(registry, id, method, document, endpoint)
        }
        _ => Reply::new(Status::MethodNotAllowed),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use ocre::interface::Interface;
    use ocre::method::Method;
    use ocre::status::Status;

    use crate::endpoint::tests::unicast;
    use crate::registry::{Registry, ResourceId};
    use crate::resource::{Reply, Resource};

    use super::dispatch;

    fn lights() -> (Registry, ResourceId) {
        let mut registry = Registry::new();
        let a = registry
            .add(
                Resource::new(0, "/light/1")
                    .resource_type("oic.r.switch.binary")
                    .observable()
                    .on_get(|_| Reply::ok(json!({"on": true})))
                    .on_put(|request| {
                        if request.document.is_some() {
                            Reply::changed()
                        } else {
                            Reply::new(Status::BadRequest)
                        }
                    }),
            )
            .unwrap();
        let b = registry
            .add(
                Resource::new(0, "/light/2")
                    .resource_type("oic.r.switch.binary")
                    .on_get(|_| Reply::ok(json!({"on": false}))),
            )
            .unwrap();
        let room = registry
            .add(Resource::new(0, "/room").resource_type("oic.wk.col").collection())
            .unwrap();
        let links = registry.get_mut(room).unwrap().links.as_mut().unwrap();
        links.0.insert(a);
        links.0.insert(b);
        (registry, room)
    }

    #[test]
    fn test_links_view() {
        let (mut registry, room) = lights();
        let reply = dispatch(
            &mut registry,
            room,
            Method::Get,
            Interface::LinkedList,
            None,
            &unicast(),
        );
        let links = reply.payload.unwrap();
        assert_eq!(links.as_array().unwrap().len(), 2);
        assert_eq!(links[0]["href"], "/light/1");
        assert_eq!(links[0]["p"]["bm"], 3);
        assert_eq!(links[1]["p"]["bm"], 1);
    }

    #[test]
    fn test_baseline_view_carries_links() {
        let (mut registry, room) = lights();
        let reply = dispatch(
            &mut registry,
            room,
            Method::Get,
            Interface::Baseline,
            None,
            &unicast(),
        );
        let document = reply.payload.unwrap();
        assert_eq!(document["rt"][0], "oic.wk.col");
        assert_eq!(document["links"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_batch_view_aggregates_members() {
        let (mut registry, room) = lights();
        let reply = dispatch(
            &mut registry,
            room,
            Method::Get,
            Interface::Batch,
            None,
            &unicast(),
        );
        let entries = reply.payload.unwrap();
        assert_eq!(entries[0], json!({"href": "/light/1", "rep": {"on": true}}));
        assert_eq!(entries[1], json!({"href": "/light/2", "rep": {"on": false}}));
    }

    #[test]
    fn test_batch_update_fans_out() {
        let (mut registry, room) = lights();
        // /light/2 has no PUT handler, so the fan-out fails as a whole.
        let reply = dispatch(
            &mut registry,
            room,
            Method::Put,
            Interface::Batch,
            Some(&json!({"on": false})),
            &unicast(),
        );
        assert_eq!(reply.status(), Status::BadRequest);
    }

    #[test]
    fn test_batch_update_all_members_succeed() {
        let (mut registry, room) = lights();
        let c = registry
            .add(
                Resource::new(0, "/light/3")
                    .on_get(|_| Reply::ok(json!({"on": false})))
                    .on_put(|_| Reply::changed()),
            )
            .unwrap();
        let links = registry.get_mut(room).unwrap().links.as_mut().unwrap();
        links.0.clear();
        links.0.insert(c);

        let reply = dispatch(
            &mut registry,
            room,
            Method::Put,
            Interface::Batch,
            Some(&json!({"on": false})),
            &unicast(),
        );
        assert_eq!(reply.status(), Status::Changed);
    }

    #[test]
    fn test_empty_collection_views() {
        let mut registry = Registry::new();
        let room = registry.add(Resource::new(0, "/room").collection()).unwrap();

        let links = dispatch(
            &mut registry,
            room,
            Method::Get,
            Interface::LinkedList,
            None,
            &unicast(),
        );
        assert_eq!(links.payload.unwrap(), Value::Array(Vec::new()));

        let batch = dispatch(
            &mut registry,
            room,
            Method::Get,
            Interface::Batch,
            None,
            &unicast(),
        );
        assert_eq!(batch.payload.unwrap(), Value::Array(Vec::new()));
    }
}
