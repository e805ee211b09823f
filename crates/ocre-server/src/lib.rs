//! `ocre-server` is the request-dispatch engine for `ocre` devices.
//!
//! A device exposes its state as a set of [`Resource`]s registered with a
//! [`DispatchEngine`]. A transport collaborator decodes each incoming
//! message into a [`CoapRequest`], hands it to the engine together with
//! the [`Endpoint`] it arrived from, and acts on the returned
//! [`Disposition`]: send the composed response, drop the exchange, or
//! acknowledge and wait for a deferred reply.
//!
//! Before a resource handler runs, the engine validates the request
//! against the registry, the selected interface, and the configured
//! authorizer. The checks run to completion and their failures are folded
//! into a single response status with a fixed precedence, so a rejection
//! never leaks which check tripped first.
//!
//! The engine also maintains the observation side of the protocol:
//! observers register through the observe option, change notifications
//! fan out to them with fresh version tags, and periodically polled
//! resources are driven by the engine's timer queue.
//!
//! The engine is synchronous and single-owner. Firmware that serves
//! several transports concurrently wraps it in a [`Server`], a command
//! loop that serializes requests, resumptions, and timer events through
//! cloneable [`EngineHandle`]s.
//!
//! [`Resource`]: resource::Resource
//! [`DispatchEngine`]: engine::DispatchEngine
//! [`CoapRequest`]: message::CoapRequest
//! [`Endpoint`]: endpoint::Endpoint
//! [`Disposition`]: message::Disposition
//! [`Server`]: server::Server
//! [`EngineHandle`]: server::EngineHandle

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Deferred exchanges and response composition.
pub mod compose;
/// Request origins and peer identities.
pub mod endpoint;
/// The dispatch engine and its configuration.
pub mod engine;
/// Error management.
pub mod error;
/// Representation version tags.
pub mod etag;
/// Decoded requests, composed responses, and exchange keys.
pub mod message;
/// Observer registrations and notification delivery.
pub mod observe;
/// Payload codecs and response buffering.
pub mod payload;
/// The resource registry and its generation-checked handles.
pub mod registry;
/// Request pre-parsing.
pub mod request;
/// Resources, handlers, and handler replies.
pub mod resource;
/// Authorization and security auditing.
pub mod security;
/// The engine command loop for async firmware.
pub mod server;

mod collection;
mod gate;
mod scheduler;

pub use scheduler::{EventKind, Scheduler};
