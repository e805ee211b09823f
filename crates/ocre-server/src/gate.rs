use tracing::{debug, warn};

use ocre::method::Method;
use ocre::outcome::{Failure, FailureSet};

use crate::endpoint::Endpoint;
use crate::payload::PayloadCodec;
use crate::registry::Registry;
use crate::request::{PreparsedRequest, device_id_matches};
use crate::security::{self, AuditSink, Authorizer, DeviceSecurityState};

/// The decision of the admission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Multicast request aimed at another device: suppress the exchange
    /// entirely, without a response.
    Drop,
    /// The checks ran; an empty set admits the request.
    Checked(FailureSet),
}

pub(crate) struct GateContext<'a> {
    pub registry: &'a Registry,
    pub authorizer: &'a dyn Authorizer,
    pub audit: &'a mut dyn AuditSink,
    pub codec: &'a dyn PayloadCodec,
    pub security_state: DeviceSecurityState,
    pub device_id: Option<&'a str>,
}

// Runs every admission check and OR-combines the failures. The checks are
// independent: none short-circuits another, so the emitted status depends
// only on the fixed precedence fold, never on detection order.
pub(crate) fn validate(
    ctx: &mut GateContext<'_>,
    preparsed: &PreparsedRequest,
    method: Method,
    endpoint: &Endpoint,
) -> Verdict {
    if endpoint.is_multicast()
        && !device_id_matches(preparsed.query.as_deref(), ctx.device_id)
    {
        debug!("multicast request filtered out by device id");
        return Verdict::Drop;
    }

    let mut failures = FailureSet::new();

    let resource = preparsed.resource.and_then(|id| ctx.registry.get(id));
    match resource {
        None => {
            warn!("no resource for {} {}", method, preparsed.path);
            failures = failures.insert(Failure::NotFound);
        }
        Some(resource) => {
            let iface = preparsed.effective_interface(ctx.registry);
            if !resource.interfaces().contains(iface) || !iface.supports_method(method) {
                warn!("interface {iface} rejects {} on {}", method, preparsed.path);
                failures = failures
                    .insert(Failure::BadRequest)
                    .insert(Failure::Forbidden);
                ctx.audit.record(security::operation_not_supported(endpoint));
            }

            if !resource.is_collection() && !resource.has_handler(method) {
                warn!("no {} handler bound for {}", method, preparsed.path);
                failures = failures.insert(Failure::MethodNotAllowed);
            }

            if !ctx.authorizer.is_authorized(method, resource, endpoint) {
                warn!("subject not authorized for {} {}", method, preparsed.path);
                failures = failures.insert(Failure::Unauthorized);
                ctx.audit.record(security::access_denied(
                    method,
                    resource,
                    endpoint,
                    ctx.security_state,
                ));
            }
        }
    }

    if !ctx.codec.supports(preparsed.content_format) {
        warn!(
            "unsupported content format {} for {}",
            preparsed.content_format, preparsed.path
        );
        failures = failures.insert(Failure::BadRequest);
    }

    Verdict::Checked(failures)
}
