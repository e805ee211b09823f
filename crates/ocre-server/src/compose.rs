use indexmap::IndexMap;

use tracing::debug;

use ocre::content::ContentFormat;
use ocre::interface::Interface;
use ocre::method::Method;
use ocre::status::Status;

use crate::endpoint::Endpoint;
use crate::message::{CoapResponse, Disposition, ExchangeKey};
use crate::registry::ResourceId;

// Everything the composer needs to turn a dispatch outcome into a wire
// instruction.
pub(crate) struct ResponseContext {
    pub status: Status,
    pub payload: Vec<u8>,
    pub content_format: ContentFormat,
    pub etag: Option<u64>,
    pub observe: Option<u32>,
    pub multicast: bool,
    pub block_size: u16,
}

// Composes the final wire instruction.
//
// A multicast exchange is answered only when it produced a useful
// representation; errors and empty results are suppressed so a discovery
// burst does not draw a storm of rejections.
pub(crate) fn finalize(ctx: ResponseContext) -> Disposition {
    if ctx.multicast && (ctx.status.is_error() || ctx.payload.is_empty()) {
        debug!("suppressing {} response to multicast request", ctx.status);
        return Disposition::Drop;
    }

    let mut response = CoapResponse::new(ctx.status.coap_code());
    response.observe = ctx.observe;
    match ctx.status {
        // The requester already holds this representation.
        Status::NotModified => {
            response.etag = ctx.etag;
        }
        Status::RequestEntityTooLarge => {
            response.size1 = Some(u32::from(ctx.block_size));
        }
        _ => {
            response.etag = ctx.etag;
            response.content_format = ctx.content_format;
            response.payload = ctx.payload;
        }
    }
    Disposition::Respond(response)
}

/// An exchange whose handler deferred, parked until the reply arrives
/// through the engine's resume entry point.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    /// Where the eventual response goes.
    pub endpoint: Endpoint,
    /// The resource the request addressed.
    pub resource: ResourceId,
    /// The deferred method.
    pub method: Method,
    /// The interface the request selected.
    pub interface: Interface,
    /// Observe option of the original request.
    pub observe: Option<u32>,
    /// The response format the requester asked for.
    pub accept: ContentFormat,
}

/// The engine's table of deferred exchanges.
#[derive(Debug, Default)]
pub struct PendingResponses {
    entries: IndexMap<ExchangeKey, PendingResponse>,
}

impl PendingResponses {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Parks an exchange. A retransmitted request replaces its entry.
    pub(crate) fn park(&mut self, key: ExchangeKey, pending: PendingResponse) {
        debug!("exchange parked for a deferred response");
        self.entries.insert(key, pending);
    }

    // Claims a parked exchange for resumption.
    pub(crate) fn take(&mut self, key: &ExchangeKey) -> Option<PendingResponse> {
        self.entries.shift_remove(key)
    }

    // Drops every exchange parked against a resource, returning how many
    // were cancelled.
    pub(crate) fn cancel_for_resource(&mut self, id: ResourceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, pending| pending.resource != id);
        before - self.entries.len()
    }

    /// Returns the number of parked exchanges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether no exchange is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
