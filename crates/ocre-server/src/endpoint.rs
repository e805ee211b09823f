use std::net::SocketAddr;

/// The identity asserted by a peer over a secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Peer `UUID`.
    pub uuid: String,
    /// Roles asserted by the peer.
    pub roles: Vec<String>,
}

impl PeerIdentity {
    /// Creates a [`PeerIdentity`] without any asserted role.
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            roles: Vec::new(),
        }
    }

    /// Adds an asserted role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// The origin of a request.
///
/// An [`Endpoint`] identifies the peer an exchange is being carried with:
/// its network address, the device index the request is aimed at, whether
/// the message arrived on a multicast address, and the identity asserted
/// over a secure session, when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    // Network address.
    address: SocketAddr,
    // Target device index.
    device: usize,
    // Whether the request arrived on a multicast address.
    multicast: bool,
    // Identity asserted over a secure session.
    identity: Option<PeerIdentity>,
}

impl Endpoint {
    /// Creates a unicast [`Endpoint`] for device `0`.
    #[must_use]
    pub const fn unicast(address: SocketAddr) -> Self {
        Self {
            address,
            device: 0,
            multicast: false,
            identity: None,
        }
    }

    /// Creates a multicast [`Endpoint`] for device `0`.
    #[must_use]
    pub const fn multicast(address: SocketAddr) -> Self {
        Self {
            address,
            device: 0,
            multicast: true,
            identity: None,
        }
    }

    /// Sets the target device index.
    #[must_use]
    pub const fn device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    /// Sets the peer identity.
    #[must_use]
    pub fn identity(mut self, identity: PeerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the network address.
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the target device index.
    #[must_use]
    pub const fn device_index(&self) -> usize {
        self.device
    }

    /// Checks whether the request arrived on a multicast address.
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.multicast
    }

    /// Returns the peer identity, if asserted.
    #[must_use]
    pub const fn peer_identity(&self) -> Option<&PeerIdentity> {
        self.identity.as_ref()
    }
}
