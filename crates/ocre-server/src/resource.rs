use std::time::Duration;

use indexmap::IndexSet;

use serde_json::Value;

use ocre::interface::{Interface, Interfaces};
use ocre::method::Method;
use ocre::status::Status;

use crate::endpoint::Endpoint;
use crate::registry::ResourceId;

/// The request view handed to a resource handler.
#[derive(Debug)]
pub struct Request<'a> {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: &'a str,
    /// Raw query string.
    pub query: Option<&'a str>,
    /// The interface the request selected, or the resource default.
    pub interface: Interface,
    /// The decoded request document, when a payload was present.
    pub document: Option<&'a Value>,
    /// The request origin.
    pub endpoint: &'a Endpoint,
}

/// The representation and status a handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub(crate) status: Status,
    pub(crate) payload: Option<Value>,
}

impl Reply {
    /// Creates a [`Reply`] with the given [`Status`] and no payload.
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            payload: None,
        }
    }

    /// Creates a successful retrieve [`Reply`] carrying a representation.
    #[must_use]
    pub const fn ok(payload: Value) -> Self {
        Self {
            status: Status::Ok,
            payload: Some(payload),
        }
    }

    /// Creates a successful update [`Reply`].
    #[must_use]
    pub const fn changed() -> Self {
        Self::new(Status::Changed)
    }

    /// Creates a successful create [`Reply`].
    #[must_use]
    pub const fn created() -> Self {
        Self::new(Status::Created)
    }

    /// Creates a successful delete [`Reply`].
    #[must_use]
    pub const fn deleted() -> Self {
        Self::new(Status::Deleted)
    }

    /// Attaches a representation.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Returns the [`Status`].
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }
}

/// What a handler returns to the dispatcher.
#[derive(Debug)]
pub enum HandlerReply {
    /// An immediate reply.
    Reply(Reply),
    /// The handler is slow: the reply will be produced out of band through
    /// the engine's resume entry point.
    Deferred,
}

impl From<Reply> for HandlerReply {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

/// A per-method handler binding.
pub type Handler = Box<dyn FnMut(&Request<'_>) -> HandlerReply + Send>;

// Collection state: the ordered set of member links.
#[derive(Debug, Default)]
pub(crate) struct Links(pub(crate) IndexSet<ResourceId>);

/// An addressable unit of application state exposed by a device.
///
/// A resource is built once, handed over to the engine, and owned by the
/// registry from registration until deletion; handlers receive a borrowed
/// [`Request`] view per invocation.
pub struct Resource {
    // Target device index.
    device: usize,
    // Path, stored with a leading slash.
    path: String,
    // Human-readable name.
    name: String,
    // Resource types.
    types: Vec<String>,
    // Declared interfaces.
    interfaces: Interfaces,
    // Interface used when a request carries no selector.
    default_interface: Interface,
    // Whether observers may register.
    observable: bool,
    // Poll period for observable resources that do not self-report.
    poll_period: Option<Duration>,
    // Per-method handler bindings, keyed by `Method::index`.
    handlers: [Option<Handler>; 4],
    // Member links, present only on collections.
    pub(crate) links: Option<Links>,
    // Current version tag, zero until assigned.
    pub(crate) etag: u64,
    // Observe sequence number; starts past the reserved register and
    // unregister option values.
    pub(crate) observe_seq: u32,
    // Live observer entries referencing this resource.
    pub(crate) num_observers: usize,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("device", &self.device)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("types", &self.types)
            .field("interfaces", &self.interfaces)
            .field("observable", &self.observable)
            .field("poll_period", &self.poll_period)
            .field("collection", &self.links.is_some())
            .field("etag", &self.etag)
            .field("num_observers", &self.num_observers)
            .finish_non_exhaustive()
    }
}

impl Resource {
    /// Creates a [`Resource`] for a device and path.
    ///
    /// The path is normalized to carry a leading slash.
    #[must_use]
    pub fn new(device: usize, path: impl Into<String>) -> Self {
        Self {
            device,
            path: normalize_path(path.into()),
            name: String::new(),
            types: Vec::new(),
            interfaces: Interfaces::init(Interface::Baseline),
            default_interface: Interface::Baseline,
            observable: false,
            poll_period: None,
            handlers: [None, None, None, None],
            links: None,
            etag: 0,
            observe_seq: 2,
            num_observers: 0,
        }
    }

    /// Sets the resource name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a resource type.
    #[must_use]
    pub fn resource_type(mut self, rt: impl Into<String>) -> Self {
        self.types.push(rt.into());
        self
    }

    /// Declares an [`Interface`] on the resource.
    #[must_use]
    pub fn interface(mut self, iface: Interface) -> Self {
        self.interfaces = self.interfaces.insert(iface);
        self
    }

    /// Sets the interface used when a request carries no selector.
    ///
    /// The interface is also added to the declared set.
    #[must_use]
    pub fn default_interface(mut self, iface: Interface) -> Self {
        self.default_interface = iface;
        self.interfaces = self.interfaces.insert(iface);
        self
    }

    /// Makes the resource observable.
    #[must_use]
    pub const fn observable(mut self) -> Self {
        self.observable = true;
        self
    }

    /// Makes the resource observable through periodic polling.
    #[must_use]
    pub const fn periodic(mut self, period: Duration) -> Self {
        self.observable = true;
        self.poll_period = Some(period);
        self
    }

    /// Turns the resource into a collection.
    ///
    /// Collections dispatch through the engine's collection logic instead
    /// of per-method handler bindings.
    #[must_use]
    pub fn collection(mut self) -> Self {
        self.links = Some(Links::default());
        self.interfaces = self
            .interfaces
            .insert(Interface::LinkedList)
            .insert(Interface::Batch);
        self
    }

    /// Binds the `GET` handler.
    #[must_use]
    #[inline]
    pub fn on_get<H, R>(self, handler: H) -> Self
    where
        H: FnMut(&Request<'_>) -> R + Send + 'static,
        R: Into<HandlerReply>,
    {
        self.bind(Method::Get, handler)
    }

    /// Binds the `PUT` handler.
    #[must_use]
    #[inline]
    pub fn on_put<H, R>(self, handler: H) -> Self
    where
        H: FnMut(&Request<'_>) -> R + Send + 'static,
        R: Into<HandlerReply>,
    {
        self.bind(Method::Put, handler)
    }

    /// Binds the `POST` handler.
    #[must_use]
    #[inline]
    pub fn on_post<H, R>(self, handler: H) -> Self
    where
        H: FnMut(&Request<'_>) -> R + Send + 'static,
        R: Into<HandlerReply>,
    {
        self.bind(Method::Post, handler)
    }

    /// Binds the `DELETE` handler.
    #[must_use]
    #[inline]
    pub fn on_delete<H, R>(self, handler: H) -> Self
    where
        H: FnMut(&Request<'_>) -> R + Send + 'static,
        R: Into<HandlerReply>,
    {
        self.bind(Method::Delete, handler)
    }

    /// Returns the device index.
    #[must_use]
    pub const fn device(&self) -> usize {
        self.device
    }

    /// Returns the normalized path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the resource name.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.name
    }

    /// Returns the resource types.
    #[must_use]
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Returns the declared interfaces.
    #[must_use]
    pub const fn interfaces(&self) -> Interfaces {
        self.interfaces
    }

    /// Returns the default interface.
    #[must_use]
    pub const fn default_iface(&self) -> Interface {
        self.default_interface
    }

    /// Checks whether observers may register.
    #[must_use]
    pub const fn is_observable(&self) -> bool {
        self.observable
    }

    /// Returns the poll period of a periodic resource.
    #[must_use]
    pub const fn poll_period(&self) -> Option<Duration> {
        self.poll_period
    }

    /// Checks whether the resource is observed through periodic polling.
    #[must_use]
    pub const fn is_periodic(&self) -> bool {
        self.poll_period.is_some()
    }

    /// Checks whether the resource is a collection.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        self.links.is_some()
    }

    /// Returns the current version tag, zero until one is assigned.
    #[must_use]
    pub const fn version_tag(&self) -> u64 {
        self.etag
    }

    /// Returns the number of live observer entries.
    #[must_use]
    pub const fn observer_count(&self) -> usize {
        self.num_observers
    }

    pub(crate) fn has_handler(&self, method: Method) -> bool {
        self.handlers[method.index()].is_some()
    }

    pub(crate) fn has_any_handler(&self) -> bool {
        self.handlers.iter().any(Option::is_some)
    }

    pub(crate) fn handler_mut(&mut self, method: Method) -> Option<&mut Handler> {
        self.handlers[method.index()].as_mut()
    }

    pub(crate) fn link_ids(&self) -> Vec<ResourceId> {
        self.links
            .as_ref()
            .map(|links| links.0.iter().copied().collect())
            .unwrap_or_default()
    }

    fn bind<H, R>(mut self, method: Method, mut handler: H) -> Self
    where
        H: FnMut(&Request<'_>) -> R + Send + 'static,
        R: Into<HandlerReply>,
    {
        self.handlers[method.index()] = Some(Box::new(move |request| handler(request).into()));
        self
    }
}

pub(crate) fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ocre::interface::Interface;
    use ocre::method::Method;

    use super::{Reply, Resource};

    #[test]
    fn test_builder_normalizes_path() {
        let resource = Resource::new(0, "light").on_get(|_| Reply::ok(serde_json::json!({})));
        assert_eq!(resource.path(), "/light");
        assert!(resource.has_handler(Method::Get));
        assert!(!resource.has_handler(Method::Put));
    }

    #[test]
    fn test_default_interface_is_declared() {
        let resource = Resource::new(0, "/temp").default_interface(Interface::Sensor);
        assert!(resource.interfaces().contains(Interface::Sensor));
        assert_eq!(resource.default_iface(), Interface::Sensor);
    }

    #[test]
    fn test_periodic_implies_observable() {
        let resource = Resource::new(0, "/temp").periodic(Duration::from_secs(1));
        assert!(resource.is_observable());
        assert!(resource.is_periodic());
    }

    #[test]
    fn test_collection_declares_link_interfaces() {
        let collection = Resource::new(0, "/room").collection();
        assert!(collection.is_collection());
        assert!(collection.interfaces().contains(Interface::LinkedList));
        assert!(collection.interfaces().contains(Interface::Batch));
    }
}
