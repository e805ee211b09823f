use serde::Serialize;

/// A payload content format, identified by its registry value on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ContentFormat {
    /// No content-format option present.
    #[default]
    Undefined,
    /// `application/json`.
    Json,
    /// `application/cbor`.
    Cbor,
    /// `application/vnd.ocf+cbor`.
    VendorCbor,
}

impl ContentFormat {
    /// Parses a content format from its registry value.
    #[must_use]
    pub const fn from_registry_value(value: u16) -> Option<Self> {
        match value {
            50 => Some(Self::Json),
            60 => Some(Self::Cbor),
            10000 => Some(Self::VendorCbor),
            _ => None,
        }
    }

    /// Returns the registry value, if the format carries one.
    #[must_use]
    pub const fn registry_value(self) -> Option<u16> {
        match self {
            Self::Undefined => None,
            Self::Json => Some(50),
            Self::Cbor => Some(60),
            Self::VendorCbor => Some(10000),
        }
    }
}

impl core::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Undefined => "undefined",
            Self::Json => "application/json",
            Self::Cbor => "application/cbor",
            Self::VendorCbor => "application/vnd.ocf+cbor",
        }
        .fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::ContentFormat;

    #[test]
    fn test_registry_values_round_trip() {
        for format in [
            ContentFormat::Json,
            ContentFormat::Cbor,
            ContentFormat::VendorCbor,
        ] {
            let value = format.registry_value().unwrap();
            assert_eq!(ContentFormat::from_registry_value(value), Some(format));
        }
        assert_eq!(ContentFormat::Undefined.registry_value(), None);
        assert_eq!(ContentFormat::from_registry_value(1234), None);
    }
}
