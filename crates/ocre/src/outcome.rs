use serde::Serialize;

use crate::status::Status;

/// A single admission-failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Failure {
    /// Conditional retrieve matched the current version tag.
    NotModified,
    /// Malformed request, unsupported content format, or bad interface.
    BadRequest,
    /// Request payload truncated or too large to buffer.
    EntityTooLarge,
    /// Selected interface does not admit the operation.
    Forbidden,
    /// Requester is not authorized for the resource.
    Unauthorized,
    /// No resource matched the request path.
    NotFound,
    /// Resource has no handler bound for the method.
    MethodNotAllowed,
}

impl Failure {
    const ALL: [Failure; 7] = [
        Self::NotModified,
        Self::BadRequest,
        Self::EntityTooLarge,
        Self::Forbidden,
        Self::Unauthorized,
        Self::NotFound,
        Self::MethodNotAllowed,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A set of independently detected admission failures.
///
/// Checks run to completion and each records its own [`Failure`]; the set is
/// then folded into one response [`Status`] by [`FailureSet::status`] with a
/// fixed precedence, so the emitted code never depends on the order in which
/// the checks happened to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(transparent)]
pub struct FailureSet(u8);

impl FailureSet {
    // Security-relevant rejections must never be masked by a more specific
    // but less sensitive failure.
    const PRECEDENCE: [(Failure, Status); 7] = [
        (Failure::Forbidden, Status::Forbidden),
        (Failure::Unauthorized, Status::Unauthorized),
        (Failure::EntityTooLarge, Status::RequestEntityTooLarge),
        (Failure::BadRequest, Status::BadRequest),
        (Failure::NotFound, Status::NotFound),
        (Failure::MethodNotAllowed, Status::MethodNotAllowed),
        (Failure::NotModified, Status::NotModified),
    ];

    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Creates a set containing a single [`Failure`].
    #[must_use]
    pub const fn init(failure: Failure) -> Self {
        Self(failure.bit())
    }

    /// Inserts a [`Failure`] returning the updated set.
    #[must_use]
    pub const fn insert(self, failure: Failure) -> Self {
        Self(self.0 | failure.bit())
    }

    /// Merges another set into this one.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Checks whether the set contains the given [`Failure`].
    #[must_use]
    pub const fn contains(self, failure: Failure) -> bool {
        self.0 & failure.bit() != 0
    }

    /// Checks whether no failure was recorded.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Checks whether the request may still be handled as a success.
    ///
    /// An empty set is a success, and so is a bare
    /// [`Failure::NotModified`]: the conditional short-circuit suppresses
    /// the body but the exchange itself succeeded.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0 || self.0 == Failure::NotModified.bit()
    }

    /// Folds the set into the response [`Status`] with fixed precedence.
    #[must_use]
    pub fn status(self) -> Status {
        for (failure, status) in Self::PRECEDENCE {
            if self.contains(failure) {
                return status;
            }
        }
        Status::Ok
    }

    /// Iterates over the recorded failures.
    pub fn iter(self) -> impl Iterator<Item = Failure> {
        Failure::ALL
            .into_iter()
            .filter(move |failure| self.contains(*failure))
    }
}

impl core::ops::BitOr for FailureSet {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        self.union(other)
    }
}

impl core::ops::BitOrAssign for FailureSet {
    fn bitor_assign(&mut self, other: Self) {
        *self = self.union(other);
    }
}

impl FromIterator<Failure> for FailureSet {
    fn from_iter<I: IntoIterator<Item = Failure>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::insert)
    }
}
