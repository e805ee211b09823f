//! `ocre` is the protocol vocabulary shared between a device-side dispatch
//! engine and its controllers.
//!
//! A device exposes its state as a set of *resources*, each addressable by a
//! path and constrained by the *interfaces* it declares. A controller
//! retrieves or updates a resource with one of the `REST`-style [`Method`]s;
//! the device answers with a [`Status`] carried on the wire as a compact
//! [`CoapCode`].
//!
//! An interface is a named semantic view of a resource: a sensor exposed
//! through a read-only interface rejects updates, while a batch interface
//! spreads one request across the members of a collection. The admission
//! rules a server applies before invoking a resource handler produce a
//! [`FailureSet`], a bitset of independent failure reasons folded into a
//! single response status with a fixed precedence.
//!
//! This crate contains no I/O and allocates only through `alloc`, so it can
//! be shared by firmware and controller builds alike.
//!
//! [`Method`]: method::Method
//! [`Status`]: status::Status
//! [`CoapCode`]: status::CoapCode
//! [`FailureSet`]: outcome::FailureSet

#![no_std]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

/// Request content formats.
pub mod content;
/// Resource interfaces and interface sets.
pub mod interface;
/// Request methods.
pub mod method;
/// Admission outcomes and their fold into a response status.
pub mod outcome;
/// Response statuses and their wire codes.
pub mod status;

#[cfg(test)]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).expect("serialization failure")
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).expect("deserialization failure")
}
