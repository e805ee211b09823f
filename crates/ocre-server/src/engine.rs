use std::time::{Duration, Instant};

use serde_json::Value;

use tracing::{debug, info, warn};

use ocre::content::ContentFormat;
use ocre::interface::Interface;
use ocre::method::Method;
use ocre::outcome::Failure;
use ocre::status::Status;

use crate::collection;
use crate::compose::{self, PendingResponse, PendingResponses, ResponseContext};
use crate::endpoint::Endpoint;
use crate::error::{Error, ErrorKind, Result};
use crate::etag::{self, ETAG_UNINITIALIZED, TagClock};
use crate::gate::{self, GateContext, Verdict};
use crate::message::{CoapRequest, CoapResponse, Disposition, ExchangeKey};
use crate::observe::{
    Notification, NotifySink, NullNotifySink, OBSERVE_REGISTER, OBSERVE_UNREGISTER, ObserverEntry,
    ObserverKey, Observers,
};
use crate::payload::{JsonCodec, PayloadCodec, ResponseBuffers, decode_document};
use crate::registry::{Registry, ResourceId};
use crate::request::PreparsedRequest;
use crate::resource::{HandlerReply, Reply, Request, Resource};
use crate::scheduler::{EventKind, Scheduler};
use crate::security::{AllowAll, AuditSink, Authorizer, DeviceSecurityState, TracingAuditSink};

/// A change in the set of discoverable resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A resource became discoverable.
    Added {
        /// Owning device index.
        device: usize,
        /// Resource path.
        path: String,
    },
    /// A resource was deleted.
    Removed {
        /// Owning device index.
        device: usize,
        /// Resource path.
        path: String,
    },
}

/// Receives [`DiscoveryEvent`]s, typically to refresh a discovery
/// document.
pub trait DiscoverySink: Send {
    /// Publishes one event.
    fn publish(&mut self, event: DiscoveryEvent);
}

/// A [`DiscoverySink`] that discards events.
#[derive(Debug, Default)]
pub struct NullDiscoverySink;

impl DiscoverySink for NullDiscoverySink {
    fn publish(&mut self, _event: DiscoveryEvent) {}
}

/// Static engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    device_ids: Vec<String>,
    block_size: u16,
    max_app_data_size: usize,
    etag_enabled: bool,
    collections_enabled: bool,
    security_state: DeviceSecurityState,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_ids: Vec::new(),
            block_size: 512,
            max_app_data_size: 8192,
            etag_enabled: true,
            collections_enabled: true,
            security_state: DeviceSecurityState::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a device id, in device-index order.
    #[must_use]
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_ids.push(id.into());
        self
    }

    /// Sets the block size used for block-wise responses.
    #[must_use]
    pub const fn block_size(mut self, size: u16) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the largest response representation the engine will buffer.
    #[must_use]
    pub const fn max_app_data_size(mut self, size: usize) -> Self {
        self.max_app_data_size = size;
        self
    }

    /// Disables version tags and conditional retrieves.
    #[must_use]
    pub const fn without_etags(mut self) -> Self {
        self.etag_enabled = false;
        self
    }

    /// Disables collection resources.
    #[must_use]
    pub const fn without_collections(mut self) -> Self {
        self.collections_enabled = false;
        self
    }

    /// Sets the security state reported in audit entries.
    #[must_use]
    pub const fn security_state(mut self, state: DeviceSecurityState) -> Self {
        self.security_state = state;
        self
    }

    /// Returns the id of a device, if one was configured.
    #[must_use]
    pub fn device_uuid(&self, device: usize) -> Option<&str> {
        self.device_ids.get(device).map(String::as_str)
    }
}

// How a handler invocation ended.
enum Invocation {
    Reply(Reply),
    Deferred,
    Unbound,
}

/// The request-dispatch engine.
///
/// One engine instance owns the resource [`Registry`], the observer table,
/// the timer queue, and the deferred-exchange table of a server process.
/// The transport collaborator feeds it decoded requests through
/// [`DispatchEngine::handle_request`] and acts on the returned
/// [`Disposition`]; time-driven work runs through
/// [`DispatchEngine::run_pending`].
///
/// The engine is synchronous and single-owner: every entry point takes
/// `&mut self`, and concurrent transports serialize through one owner
/// such as the [`Server`](crate::server::Server) command loop.
pub struct DispatchEngine {
    config: EngineConfig,
    registry: Registry,
    observers: Observers,
    scheduler: Scheduler,
    pending: PendingResponses,
    buffers: ResponseBuffers,
    clock: TagClock,
    codec: Box<dyn PayloadCodec>,
    authorizer: Box<dyn Authorizer>,
    audit: Box<dyn AuditSink>,
    notifier: Box<dyn NotifySink>,
    discovery: Box<dyn DiscoverySink>,
}

impl DispatchEngine {
    /// Creates an engine with the default collaborators: a `JSON` codec,
    /// an allow-all authorizer, and audit entries forwarded to `tracing`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let buffers = ResponseBuffers::new(config.block_size, config.max_app_data_size);
        Self {
            config,
            registry: Registry::new(),
            observers: Observers::new(),
            scheduler: Scheduler::new(),
            pending: PendingResponses::new(),
            buffers,
            clock: TagClock::new(),
            codec: Box::new(JsonCodec),
            authorizer: Box::new(AllowAll),
            audit: Box::new(TracingAuditSink),
            notifier: Box::new(NullNotifySink),
            discovery: Box::new(NullDiscoverySink),
        }
    }

    /// Replaces the payload codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl PayloadCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replaces the authorizer.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Box::new(audit);
        self
    }

    /// Replaces the notification sink.
    #[must_use]
    pub fn with_notify_sink(mut self, notifier: impl NotifySink + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Replaces the discovery sink.
    #[must_use]
    pub fn with_discovery_sink(mut self, discovery: impl DiscoverySink + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    /// Returns the resource registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the observer table.
    #[must_use]
    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Returns the deferred-exchange table.
    #[must_use]
    pub fn pending_responses(&self) -> &PendingResponses {
        &self.pending
    }

    /// Registers a resource and announces it for discovery.
    ///
    /// The resource receives its first version tag here, so a retrieve is
    /// taggable before the first update.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid resource, a duplicate path, or a
    /// collection when collections are disabled.
    pub fn register(&mut self, resource: Resource) -> Result<ResourceId> {
        if resource.is_collection() && !self.config.collections_enabled {
            return Err(Error::new(ErrorKind::Registry, "collections are disabled"));
        }
        let device = resource.device();
        let path = resource.path().to_owned();
        let id = self.registry.add(resource)?;
        if let Some(stored) = self.registry.get_mut(id) {
            stored.etag = self.clock.next();
        }
        self.discovery.publish(DiscoveryEvent::Added { device, path });
        Ok(id)
    }

    /// Dispatches one decoded request.
    #[must_use]
    pub fn handle_request(&mut self, request: &CoapRequest, endpoint: &Endpoint) -> Disposition {
        let method = request.method;
        let key = ExchangeKey::new(request, endpoint);
        let preparsed = PreparsedRequest::prepare(&self.registry, request, endpoint);
        let iface = preparsed.effective_interface(&self.registry);

        let verdict = gate::validate(
            &mut GateContext {
                registry: &self.registry,
                authorizer: self.authorizer.as_ref(),
                audit: self.audit.as_mut(),
                codec: self.codec.as_ref(),
                security_state: self.config.security_state,
                device_id: self.config.device_uuid(endpoint.device_index()),
            },
            &preparsed,
            method,
            endpoint,
        );
        let mut failures = match verdict {
            Verdict::Drop => return Disposition::Drop,
            Verdict::Checked(failures) => failures,
        };

        let mut current = ETAG_UNINITIALIZED;
        if self.config.etag_enabled {
            if let Some(id) = preparsed.resource {
                current = etag::current_tag(&self.registry, id, iface);
                failures |= etag::check_conditional(method, request.etag, current);
            }
        }

        let document = match decode_document(
            self.codec.as_ref(),
            &request.payload,
            request.content_format,
        ) {
            Ok(document) => document,
            Err(decode_failures) => {
                failures |= decode_failures;
                None
            }
        };

        if !failures.is_success() {
            return compose::finalize(ResponseContext {
                status: failures.status(),
                payload: Vec::new(),
                content_format: ContentFormat::Undefined,
                etag: None,
                observe: None,
                multicast: endpoint.is_multicast(),
                block_size: self.buffers.block_size(),
            });
        }
        let Some(id) = preparsed.resource else {
            // The gate admits a request only when the path matched.
            return compose::finalize(ResponseContext {
                status: Status::NotFound,
                payload: Vec::new(),
                content_format: ContentFormat::Undefined,
                etag: None,
                observe: None,
                multicast: endpoint.is_multicast(),
                block_size: self.buffers.block_size(),
            });
        };

        let mut observe_echo = None;
        let mut registered = None;
        match request.observe {
            Some(OBSERVE_REGISTER) if method == Method::Get => {
                if let Some(seq) = self.register_observer(id, iface, request, endpoint) {
                    observe_echo = Some(seq);
                    registered = Some(ObserverKey {
                        address: endpoint.address(),
                        token: request.token.clone(),
                    });
                }
            }
            Some(OBSERVE_UNREGISTER) => {
                self.unregister_observer(&ObserverKey {
                    address: endpoint.address(),
                    token: request.token.clone(),
                });
            }
            _ => {}
        }

        let is_collection = preparsed.is_collection;
        let reply = if is_collection {
            collection::dispatch(
                &mut self.registry,
                id,
                method,
                iface,
                document.as_ref(),
                endpoint,
            )
        } else {
            match self.invoke(
                id,
                method,
                iface,
                preparsed.query.as_deref(),
                document.as_ref(),
                endpoint,
            ) {
                Invocation::Reply(reply) => reply,
                Invocation::Deferred => {
                    self.pending.park(
                        key,
                        PendingResponse {
                            endpoint: endpoint.clone(),
                            resource: id,
                            method,
                            interface: iface,
                            observe: request.observe,
                            accept: request.accept,
                        },
                    );
                    return Disposition::Deferred;
                }
                Invocation::Unbound => Reply::new(Status::MethodNotAllowed),
            }
        };

        let mut status = reply.status();
        if status.is_error() {
            if let Some(rollback) = registered.take() {
                // The registration made ahead of a failed retrieve must
                // not survive it.
                self.unregister_observer(&rollback);
                observe_echo = None;
            }
        } else {
            match method {
                Method::Put | Method::Post => self.record_update(id, iface, is_collection),
                Method::Delete => self.schedule_delete(id, Duration::ZERO),
                Method::Get => {}
            }
        }

        // A matched conditional retrieve keeps the handler's side effects
        // but suppresses the body.
        if failures.contains(Failure::NotModified) && !status.is_error() {
            return compose::finalize(ResponseContext {
                status: Status::NotModified,
                payload: Vec::new(),
                content_format: ContentFormat::Undefined,
                etag: Some(current),
                observe: observe_echo,
                multicast: endpoint.is_multicast(),
                block_size: self.buffers.block_size(),
            });
        }

        let mut payload = Vec::new();
        let mut content_format = ContentFormat::Undefined;
        if let Some(document) = reply.payload {
            let (bytes, format) = self.codec.encode(&document, request.accept);
            match self.buffers.fill(&key, bytes) {
                Ok(encoded) => {
                    payload = encoded.to_vec();
                    content_format = format;
                }
                Err(overflow) => status = overflow.status(),
            }
            if request.block2_size.is_none() {
                self.buffers.release(&key);
            }
        }

        let etag = (self.config.etag_enabled && method == Method::Get && !status.is_error())
            .then(|| etag::current_tag(&self.registry, id, iface))
            .filter(|tag| *tag != ETAG_UNINITIALIZED);

        compose::finalize(ResponseContext {
            status,
            payload,
            content_format,
            etag,
            observe: observe_echo,
            multicast: endpoint.is_multicast(),
            block_size: self.buffers.block_size(),
        })
    }

    /// Completes a deferred exchange.
    ///
    /// Returns the endpoint to answer and the composed instruction, or
    /// `None` when no exchange is parked under the key, as after the
    /// resource's deletion.
    pub fn resume(&mut self, key: &ExchangeKey, reply: Reply) -> Option<(Endpoint, Disposition)> {
        let pending = self.pending.take(key)?;
        let mut status = reply.status();

        if !status.is_error() {
            match pending.method {
                Method::Put | Method::Post => {
                    self.record_update(pending.resource, pending.interface, false);
                }
                Method::Delete => self.schedule_delete(pending.resource, Duration::ZERO),
                Method::Get => {}
            }
        }

        let mut payload = Vec::new();
        let mut content_format = ContentFormat::Undefined;
        if let Some(document) = reply.payload {
            let (bytes, format) = self.codec.encode(&document, pending.accept);
            match self.buffers.fill(key, bytes) {
                Ok(encoded) => {
                    payload = encoded.to_vec();
                    content_format = format;
                }
                Err(overflow) => status = overflow.status(),
            }
            self.buffers.release(key);
        }

        let etag = (self.config.etag_enabled
            && pending.method == Method::Get
            && !status.is_error())
        .then(|| etag::current_tag(&self.registry, pending.resource, pending.interface))
        .filter(|tag| *tag != ETAG_UNINITIALIZED);

        let disposition = compose::finalize(ResponseContext {
            status,
            payload,
            content_format,
            etag,
            observe: None,
            multicast: pending.endpoint.is_multicast(),
            block_size: self.buffers.block_size(),
        });
        Some((pending.endpoint, disposition))
    }

    /// Signals that a resource's state changed outside a request.
    ///
    /// Assigns a fresh version tag and queues a change notification.
    pub fn resource_changed(&mut self, id: ResourceId) {
        if let Some(resource) = self.registry.get_mut(id) {
            resource.etag = self.clock.next();
            self.scheduler
                .schedule(id, EventKind::NotifyChanged, Instant::now());
        }
    }

    /// Marks a resource for deletion after a delay.
    ///
    /// The resource stops matching new requests immediately; the teardown
    /// itself runs from [`DispatchEngine::run_pending`], so an in-flight
    /// response can still be sent.
    pub fn schedule_delete(&mut self, id: ResourceId, delay: Duration) {
        if self.registry.mark_pending_delete(id) {
            self.scheduler
                .schedule(id, EventKind::DeleteResource, Instant::now() + delay);
        }
    }

    /// Deletes a resource and tears down everything referencing it.
    ///
    /// # Errors
    ///
    /// Returns an error for a stale handle.
    pub fn delete_resource(&mut self, id: ResourceId) -> Result<()> {
        if self.registry.get(id).is_none() {
            return Err(Error::new(ErrorKind::Registry, "unknown resource"));
        }

        // Detach from every collection linking it, waking their observers.
        for collection in self.registry.collections_linking(id) {
            if let Some(links) = self
                .registry
                .get_mut(collection)
                .and_then(|resource| resource.links.as_mut())
            {
                links.0.shift_remove(&id);
            }
            if self.observers.count_for(collection) > 0 {
                self.notify_observers(collection, None, false);
            }
        }

        let dropped = self.observers.remove_by_resource(id);
        if self.observers.remove_poll(id) || dropped > 0 {
            debug!("dropped {dropped} observers of the deleted resource");
        }
        self.scheduler.cancel_all(id);
        let cancelled = self.pending.cancel_for_resource(id);
        if cancelled > 0 {
            debug!("cancelled {cancelled} deferred exchanges");
        }

        let Some(resource) = self.registry.remove(id) else {
            return Err(Error::new(ErrorKind::Registry, "unknown resource"));
        };
        self.discovery.publish(DiscoveryEvent::Removed {
            device: resource.device(),
            path: resource.path().to_owned(),
        });
        info!("deleted resource {}", resource.path());
        Ok(())
    }

    /// Adds a member link to a collection, waking its observers.
    ///
    /// # Errors
    ///
    /// Returns an error when either handle is stale or the target is not
    /// a collection.
    pub fn add_link(&mut self, collection: ResourceId, member: ResourceId) -> Result<()> {
        if self.registry.get(member).is_none() {
            return Err(Error::new(ErrorKind::Registry, "unknown member"));
        }
        let Some(links) = self
            .registry
            .get_mut(collection)
            .and_then(|resource| resource.links.as_mut())
        else {
            return Err(Error::new(ErrorKind::Registry, "not a collection"));
        };
        links.0.insert(member);
        if self.observers.count_for(collection) > 0 {
            self.notify_observers(collection, None, false);
        }
        Ok(())
    }

    /// Removes a member link from a collection, waking its observers.
    ///
    /// # Errors
    ///
    /// Returns an error when the link does not exist.
    pub fn remove_link(&mut self, collection: ResourceId, member: ResourceId) -> Result<()> {
        let removed = self
            .registry
            .get_mut(collection)
            .and_then(|resource| resource.links.as_mut())
            .is_some_and(|links| links.0.shift_remove(&member));
        if !removed {
            return Err(Error::new(ErrorKind::Registry, "no such link"));
        }
        if self.observers.count_for(collection) > 0 {
            self.notify_observers(collection, None, false);
        }
        Ok(())
    }

    /// Returns the deadline of the next queued timer event.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Runs every timer event due at `now`.
    pub fn run_pending(&mut self, now: Instant) {
        for (id, kind) in self.scheduler.take_due(now) {
            match kind {
                EventKind::DeleteResource => {
                    if let Err(e) = self.delete_resource(id) {
                        warn!("scheduled delete failed: {e}");
                    }
                }
                EventKind::NotifyChanged => self.notify_observers(id, None, true),
                EventKind::NotifyDefaults(iface) => self.notify_observers(id, Some(iface), false),
                EventKind::Poll => {
                    if !self.observers.is_polled(id) {
                        continue;
                    }
                    self.notify_observers(id, None, true);
                    if let Some(period) = self.registry.get(id).and_then(Resource::poll_period) {
                        self.scheduler.schedule(id, EventKind::Poll, now + period);
                    }
                }
            }
        }
    }

    /// Drops all observers, timers, deferred exchanges, and buffers.
    ///
    /// Registered resources survive a reset.
    pub fn reset(&mut self) {
        self.observers.clear();
        self.scheduler.clear();
        self.pending.clear();
        self.buffers.clear();
        // No entry references any resource anymore.
        for id in self.registry.all_ids() {
            if let Some(resource) = self.registry.get_mut(id) {
                resource.num_observers = 0;
            }
        }
        info!("engine state reset");
    }

    /// Resets the engine and drops every registered resource.
    ///
    /// Unlike [`DispatchEngine::delete_resource`], no discovery events are
    /// emitted: the whole engine is going away.
    pub fn shutdown(&mut self) {
        self.reset();
        for id in self.registry.all_ids() {
            let _ = self.registry.remove(id);
        }
        info!("engine shut down");
    }

    // Invokes the bound handler of a plain resource.
    fn invoke(
        &mut self,
        id: ResourceId,
        method: Method,
        iface: Interface,
        query: Option<&str>,
        document: Option<&Value>,
        endpoint: &Endpoint,
    ) -> Invocation {
        let Some(resource) = self.registry.get_mut(id) else {
            return Invocation::Unbound;
        };
        let path = resource.path().to_owned();
        let Some(handler) = resource.handler_mut(method) else {
            return Invocation::Unbound;
        };
        let request = Request {
            method,
            path: &path,
            query,
            interface: iface,
            document,
            endpoint,
        };
        match handler(&request) {
            HandlerReply::Reply(reply) => Invocation::Reply(reply),
            HandlerReply::Deferred => Invocation::Deferred,
        }
    }

    // Registers an observer ahead of the retrieve, returning the sequence
    // number to echo. Registration on a batch view checks every member and
    // rolls its poll additions back when one is denied.
    fn register_observer(
        &mut self,
        id: ResourceId,
        iface: Interface,
        request: &CoapRequest,
        endpoint: &Endpoint,
    ) -> Option<u32> {
        if endpoint.is_multicast() {
            return None;
        }
        let resource = self.registry.get(id)?;
        if !resource.is_observable() {
            debug!("{} is not observable", resource.path());
            return None;
        }
        let is_collection = resource.is_collection();
        let period = resource.poll_period();
        let members = resource.link_ids();

        if is_collection {
            let mut added = Vec::new();
            for member in &members {
                let Some(member_res) = self.registry.get(*member) else {
                    continue;
                };
                if !self
                    .authorizer
                    .is_authorized(Method::Get, member_res, endpoint)
                {
                    self.audit.record(crate::security::access_denied(
                        Method::Get,
                        member_res,
                        endpoint,
                        self.config.security_state,
                    ));
                    // Undo the polls this registration introduced.
                    for undo in added {
                        self.observers.remove_poll(undo);
                        self.scheduler.cancel(undo, EventKind::Poll);
                    }
                    return None;
                }
                // Only a batch registration is fed by member polls.
                if iface != Interface::Batch {
                    continue;
                }
                if let Some(member_period) = member_res.poll_period() {
                    if self.observers.add_poll(*member) {
                        self.scheduler.schedule(
                            *member,
                            EventKind::Poll,
                            Instant::now() + member_period,
                        );
                        added.push(*member);
                    }
                }
            }
        }

        let key = ObserverKey {
            address: endpoint.address(),
            token: request.token.clone(),
        };
        let replaced = self.observers.add(
            key,
            ObserverEntry {
                resource: id,
                endpoint: endpoint.clone(),
                interface: iface,
                accept: request.accept,
                block2_size: request.block2_size,
            },
        );
        match replaced {
            // A refresh of an existing watch leaves the counts alone.
            Some(previous) if previous.resource == id => {}
            // The same watcher moved to another resource under its token.
            Some(previous) => {
                self.release_observation(previous.resource);
                if let Some(stored) = self.registry.get_mut(id) {
                    stored.num_observers += 1;
                }
            }
            None => {
                if let Some(stored) = self.registry.get_mut(id) {
                    stored.num_observers += 1;
                }
            }
        }
        if let Some(period) = period {
            if self.observers.add_poll(id) {
                self.scheduler
                    .schedule(id, EventKind::Poll, Instant::now() + period);
            }
        }
        self.registry.get(id).map(|stored| stored.observe_seq)
    }

    fn unregister_observer(&mut self, key: &ObserverKey) {
        let Some(entry) = self.observers.remove_by_key(key) else {
            return;
        };
        self.release_observation(entry.resource);
        debug!("observer unregistered from {:?}", entry.resource);
    }

    // Drops one watcher's claim on a resource after its entry left the
    // table: the observer count falls and, once nobody watches the
    // resource, its poll (and the member polls a batch registration
    // introduced) retires.
    fn release_observation(&mut self, id: ResourceId) {
        if let Some(resource) = self.registry.get_mut(id) {
            resource.num_observers = resource.num_observers.saturating_sub(1);
        }
        if self.observers.count_for(id) == 0 {
            if self.observers.remove_poll(id) {
                self.scheduler.cancel(id, EventKind::Poll);
            }
            let members = self
                .registry
                .get(id)
                .map(Resource::link_ids)
                .unwrap_or_default();
            for member in members {
                if self.observers.count_for(member) == 0 && self.observers.remove_poll(member) {
                    self.scheduler.cancel(member, EventKind::Poll);
                }
            }
        }
    }

    // Post-update bookkeeping: fresh version tags and queued change
    // notifications.
    fn record_update(&mut self, id: ResourceId, iface: Interface, is_collection: bool) {
        let now = Instant::now();
        if is_collection && iface == Interface::Batch {
            // A batch update went through every member's own handler.
            let members = self
                .registry
                .get(id)
                .map(Resource::link_ids)
                .unwrap_or_default();
            for member in members {
                if let Some(resource) = self.registry.get_mut(member) {
                    resource.etag = self.clock.next();
                    self.scheduler
                        .schedule(member, EventKind::NotifyChanged, now);
                }
            }
        }
        if let Some(resource) = self.registry.get_mut(id) {
            resource.etag = self.clock.next();
        }
        let kind = match iface {
            Interface::Startup | Interface::StartupRevert => EventKind::NotifyDefaults(iface),
            _ => EventKind::NotifyChanged,
        };
        self.scheduler.schedule(id, kind, now);
    }

    // Pushes the current representation to every observer of a resource,
    // then, for a changed member, to the observers of the collections
    // linking it.
    fn notify_observers(&mut self, id: ResourceId, iface_override: Option<Interface>, fan_out: bool) {
        let Some(resource) = self.registry.get_mut(id) else {
            return;
        };
        resource.observe_seq = resource.observe_seq.wrapping_add(1);
        let seq = resource.observe_seq;
        let is_collection = resource.is_collection();

        let watchers: Vec<(ObserverKey, ObserverEntry)> = self
            .observers
            .for_resource(id)
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        for (key, entry) in watchers {
            let iface = iface_override.unwrap_or(entry.interface);
            let reply = if is_collection {
                collection::dispatch(
                    &mut self.registry,
                    id,
                    Method::Get,
                    iface,
                    None,
                    &entry.endpoint,
                )
            } else {
                match self.invoke(id, Method::Get, iface, None, None, &entry.endpoint) {
                    Invocation::Reply(reply) => reply,
                    Invocation::Deferred | Invocation::Unbound => continue,
                }
            };
            if reply.status().is_error() {
                continue;
            }
            let Some(document) = reply.payload else {
                continue;
            };
            let (bytes, format) = self.codec.encode(&document, entry.accept);
            let tag = self
                .config
                .etag_enabled
                .then(|| etag::current_tag(&self.registry, id, iface))
                .filter(|tag| *tag != ETAG_UNINITIALIZED);

            let mut response = CoapResponse::new(Status::Ok.coap_code());
            response.payload = bytes;
            response.content_format = format;
            response.etag = tag;
            response.observe = Some(seq);
            self.notifier.notify(Notification {
                endpoint: entry.endpoint,
                token: key.token,
                response,
            });
        }

        if fan_out {
            for collection in self.registry.collections_linking(id) {
                if self.observers.count_for(collection) > 0 {
                    self.notify_observers(collection, None, false);
                }
            }
        }
    }
}
