use serde::Serialize;

use crate::method::Method;

/// A named semantic view of a resource.
///
/// The interface selected by a request constrains which methods are
/// meaningful on the resource: a sensor interface is retrieve-only, an
/// actuator interface accepts updates, a batch interface spreads a request
/// across the members of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Interface {
    /// Baseline view: full representation including common properties.
    Baseline,
    /// Linked-list view over the links of a collection.
    LinkedList,
    /// Batch view: one request fans out to every collection member.
    Batch,
    /// Read-only view.
    Read,
    /// Read-write view.
    ReadWrite,
    /// Actuator view.
    Actuator,
    /// Sensor view.
    Sensor,
    /// Creation view for collections that instantiate members.
    Create,
    /// Write-only view.
    Write,
    /// Startup-defaults view.
    Startup,
    /// Startup-defaults revert view.
    StartupRevert,
}

impl Interface {
    const ALL: [Interface; 11] = [
        Self::Baseline,
        Self::LinkedList,
        Self::Batch,
        Self::Read,
        Self::ReadWrite,
        Self::Actuator,
        Self::Sensor,
        Self::Create,
        Self::Write,
        Self::Startup,
        Self::StartupRevert,
    ];

    /// Returns the interface name used in query strings and link payloads.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Baseline => "oic.if.baseline",
            Self::LinkedList => "oic.if.ll",
            Self::Batch => "oic.if.b",
            Self::Read => "oic.if.r",
            Self::ReadWrite => "oic.if.rw",
            Self::Actuator => "oic.if.a",
            Self::Sensor => "oic.if.s",
            Self::Create => "oic.if.create",
            Self::Write => "oic.if.w",
            Self::Startup => "oic.if.startup",
            Self::StartupRevert => "oic.if.startup.revert",
        }
    }

    /// Parses an interface from its query-string name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|iface| iface.name() == name)
    }

    /// Checks whether the interface admits the given method.
    #[must_use]
    pub const fn supports_method(self, method: Method) -> bool {
        match self {
            // Retrieve-only views.
            Self::LinkedList | Self::Sensor | Self::Read => matches!(method, Method::Get),
            // Update-only views.
            Self::Write => matches!(method, Method::Put | Method::Post | Method::Delete),
            Self::Create => matches!(method, Method::Get | Method::Put | Method::Post),
            // Views admitting both retrieve and update.
            Self::ReadWrite
            | Self::Batch
            | Self::Baseline
            | Self::Actuator
            | Self::Startup
            | Self::StartupRevert => true,
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl core::fmt::Display for Interface {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.name().fmt(f)
    }
}

/// A set of [`Interface`]s declared by a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(transparent)]
pub struct Interfaces(u16);

impl Interfaces {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Creates a set containing a single [`Interface`].
    #[must_use]
    pub const fn init(iface: Interface) -> Self {
        Self(iface.bit())
    }

    /// Inserts an [`Interface`] returning the updated set.
    #[must_use]
    pub const fn insert(self, iface: Interface) -> Self {
        Self(self.0 | iface.bit())
    }

    /// Checks whether the set contains the given [`Interface`].
    #[must_use]
    pub const fn contains(self, iface: Interface) -> bool {
        self.0 & iface.bit() != 0
    }

    /// Checks whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the contained interfaces.
    pub fn iter(self) -> impl Iterator<Item = Interface> {
        Interface::ALL
            .into_iter()
            .filter(move |iface| self.contains(*iface))
    }
}

impl FromIterator<Interface> for Interfaces {
    fn from_iter<I: IntoIterator<Item = Interface>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::insert)
    }
}

#[cfg(test)]
mod tests {
    use crate::method::Method;

    use super::{Interface, Interfaces};

    #[test]
    fn test_names_round_trip() {
        for iface in Interface::ALL {
            assert_eq!(Interface::from_name(iface.name()), Some(iface));
        }
        assert_eq!(Interface::from_name("oic.if.nope"), None);
    }

    #[test]
    fn test_retrieve_only_views() {
        for iface in [Interface::LinkedList, Interface::Sensor, Interface::Read] {
            assert!(iface.supports_method(Method::Get));
            assert!(!iface.supports_method(Method::Put));
            assert!(!iface.supports_method(Method::Post));
            assert!(!iface.supports_method(Method::Delete));
        }
    }

    #[test]
    fn test_update_only_views() {
        assert!(!Interface::Write.supports_method(Method::Get));
        assert!(Interface::Write.supports_method(Method::Put));
        assert!(Interface::Write.supports_method(Method::Post));
        assert!(Interface::Write.supports_method(Method::Delete));
    }

    #[test]
    fn test_create_view() {
        assert!(Interface::Create.supports_method(Method::Get));
        assert!(Interface::Create.supports_method(Method::Put));
        assert!(Interface::Create.supports_method(Method::Post));
        assert!(!Interface::Create.supports_method(Method::Delete));
    }

    #[test]
    fn test_full_views() {
        for iface in [
            Interface::Baseline,
            Interface::ReadWrite,
            Interface::Batch,
            Interface::Actuator,
            Interface::Startup,
            Interface::StartupRevert,
        ] {
            for method in Method::ALL {
                assert!(iface.supports_method(method));
            }
        }
    }

    #[test]
    fn test_set_operations() {
        let set = Interfaces::init(Interface::Baseline).insert(Interface::ReadWrite);
        assert!(set.contains(Interface::Baseline));
        assert!(set.contains(Interface::ReadWrite));
        assert!(!set.contains(Interface::Batch));
        assert_eq!(set.iter().count(), 2);
        assert!(Interfaces::new().is_empty());
    }

    #[cfg(feature = "deserialize")]
    #[test]
    fn test_serialization() {
        let set = Interfaces::init(Interface::Sensor).insert(Interface::Baseline);
        assert_eq!(
            crate::deserialize::<Interfaces>(crate::serialize(set)),
            set
        );
    }
}
