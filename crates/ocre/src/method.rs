use serde::Serialize;

/// The kind of `REST` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Method {
    /// `GET` request.
    Get,
    /// `POST` request.
    Post,
    /// `PUT` request.
    Put,
    /// `DELETE` request.
    Delete,
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
        .fmt(f)
    }
}

impl Method {
    /// All methods, in wire-code order.
    pub const ALL: [Method; 4] = [Self::Get, Self::Post, Self::Put, Self::Delete];

    /// Returns the operation verb used in access-denial audit entries.
    #[must_use]
    pub const fn audit_verb(self) -> &'static str {
        match self {
            Self::Get => "RETRIEVE",
            Self::Post | Self::Put => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Returns `true` for the methods that may alter resource state.
    #[must_use]
    pub const fn is_update(self) -> bool {
        matches!(self, Self::Put | Self::Post)
    }

    /// Returns a stable index usable to key per-method tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Get => 0,
            Self::Post => 1,
            Self::Put => 2,
            Self::Delete => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Method;

    #[test]
    fn test_display() {
        let expected = ["GET", "POST", "PUT", "DELETE"];
        for (method, expected) in Method::ALL.iter().zip(expected) {
            assert_eq!(alloc::format!("{method}"), expected);
        }
    }

    #[test]
    fn test_audit_verbs() {
        assert_eq!(Method::Get.audit_verb(), "RETRIEVE");
        assert_eq!(Method::Put.audit_verb(), "UPDATE");
        assert_eq!(Method::Post.audit_verb(), "UPDATE");
        assert_eq!(Method::Delete.audit_verb(), "DELETE");
    }

    #[test]
    fn test_indexes_are_distinct() {
        for (position, method) in Method::ALL.iter().enumerate() {
            assert_eq!(method.index(), position);
        }
    }
}
