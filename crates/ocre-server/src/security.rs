use tracing::warn;

use ocre::method::Method;

use crate::endpoint::Endpoint;
use crate::resource::Resource;

/// The onboarding state of a device, reported in audit entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceSecurityState {
    /// Factory reset.
    Reset,
    /// Ready for ownership transfer.
    ReadyForOwnershipTransfer,
    /// Being provisioned.
    Provisioning,
    /// Normal operation.
    #[default]
    NormalOperation,
    /// Soft reset.
    SoftReset,
}

impl std::fmt::Display for DeviceSecurityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => "RESET",
            Self::ReadyForOwnershipTransfer => "RFOTM",
            Self::Provisioning => "RFPRO",
            Self::NormalOperation => "RFNOP",
            Self::SoftReset => "SRESET",
        }
        .fmt(f)
    }
}

/// Decides whether a requester may perform a method on a resource.
pub trait Authorizer: Send {
    /// Checks the requester's access.
    fn is_authorized(&self, method: Method, resource: &Resource, endpoint: &Endpoint) -> bool;
}

/// An [`Authorizer`] admitting every request.
#[derive(Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_authorized(&self, _method: Method, _resource: &Resource, _endpoint: &Endpoint) -> bool {
        true
    }
}

/// A security-relevant event emitted alongside a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Device index the rejected request targeted.
    pub device: usize,
    /// Stable event code.
    pub code: &'static str,
    /// Event message.
    pub message: &'static str,
    /// Supporting detail lines.
    pub details: Vec<String>,
}

/// Receives [`AuditEntry`] values.
pub trait AuditSink: Send {
    /// Records an entry.
    fn record(&mut self, entry: AuditEntry);
}

/// An [`AuditSink`] forwarding entries to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, entry: AuditEntry) {
        warn!(
            device = entry.device,
            code = entry.code,
            details = ?entry.details,
            "{}",
            entry.message
        );
    }
}

// Builds the access-denied entry: requester address and identity, target
// path, attempted operation, device state, and asserted roles.
pub(crate) fn access_denied(
    method: Method,
    resource: &Resource,
    endpoint: &Endpoint,
    state: DeviceSecurityState,
) -> AuditEntry {
    let mut details = vec![endpoint.address().to_string()];
    if let Some(identity) = endpoint.peer_identity() {
        details.push(identity.uuid.clone());
    }
    details.push(resource.path().to_owned());
    details.push(format!("attempt to {} the resource", method.audit_verb()));
    details.push(format!("device is in {state}"));
    let roles = endpoint
        .peer_identity()
        .filter(|identity| !identity.roles.is_empty())
        .map_or_else(
            || "No roles asserted".to_owned(),
            |identity| identity.roles.join(" "),
        );
    details.push(roles);

    AuditEntry {
        device: endpoint.device_index(),
        code: "AC-1",
        message: "Access Denied",
        details,
    }
}

// Builds the entry raised when the selected interface rejects an
// operation.
pub(crate) fn operation_not_supported(endpoint: &Endpoint) -> AuditEntry {
    AuditEntry {
        device: endpoint.device_index(),
        code: "COMM-1",
        message: "Operation not supported",
        details: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use ocre::method::Method;

    use crate::endpoint::tests::unicast;
    use crate::endpoint::PeerIdentity;
    use crate::resource::{Reply, Resource};

    use super::{DeviceSecurityState, access_denied};

    #[test]
    fn test_access_denied_details() {
        let resource = Resource::new(0, "/door").on_put(|_| Reply::changed());
        let endpoint = unicast().identity(PeerIdentity::new("peer-uuid").role("guest"));

        let entry = access_denied(
            Method::Put,
            &resource,
            &endpoint,
            DeviceSecurityState::NormalOperation,
        );

        assert_eq!(entry.code, "AC-1");
        assert!(entry.details.contains(&"peer-uuid".to_owned()));
        assert!(entry.details.contains(&"/door".to_owned()));
        assert!(
            entry
                .details
                .contains(&"attempt to UPDATE the resource".to_owned())
        );
        assert!(entry.details.contains(&"device is in RFNOP".to_owned()));
        assert!(entry.details.contains(&"guest".to_owned()));
    }

    #[test]
    fn test_no_roles_asserted() {
        let resource = Resource::new(0, "/door").on_put(|_| Reply::changed());
        let entry = access_denied(
            Method::Get,
            &resource,
            &unicast(),
            DeviceSecurityState::ReadyForOwnershipTransfer,
        );
        assert!(entry.details.contains(&"No roles asserted".to_owned()));
        assert!(entry.details.contains(&"device is in RFOTM".to_owned()));
    }
}
