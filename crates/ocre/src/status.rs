use log::warn;

use serde::Serialize;

/// A compact `class.detail` response code as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(transparent)]
pub struct CoapCode(u8);

impl CoapCode {
    /// Creates a code from its class and detail parts.
    ///
    /// For example, `CoapCode::new(4, 4)` is `4.04 Not Found`.
    #[must_use]
    pub const fn new(class: u8, detail: u8) -> Self {
        Self((class << 5) | (detail & 0x1F))
    }

    /// Returns the code class (2 for success, 4 and 5 for errors).
    #[must_use]
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    /// Returns the code detail.
    #[must_use]
    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// Checks whether the code signals an error.
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.class() >= 4
    }

    /// Returns the raw code byte.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for CoapCode {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// A response status.
///
/// The discriminant order is meaningful: every status greater than or equal
/// to [`Status::BadRequest`] is an error, a property the engine relies on
/// when suppressing multicast error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Status {
    /// Retrieve succeeded.
    Ok,
    /// Resource created.
    Created,
    /// Update succeeded.
    Changed,
    /// Resource deleted.
    Deleted,
    /// Conditional retrieve matched the current version tag.
    NotModified,
    /// Malformed or inadmissible request.
    BadRequest,
    /// Requester lacks access to the resource.
    Unauthorized,
    /// Unrecognized or malformed request option.
    BadOption,
    /// Operation not supported by the selected interface.
    Forbidden,
    /// No resource matched the request path.
    NotFound,
    /// Resource has no handler bound for the method.
    MethodNotAllowed,
    /// Requested representation format is not available.
    NotAcceptable,
    /// Request payload exceeds what the server can buffer.
    RequestEntityTooLarge,
    /// Request content format is not supported.
    UnsupportedMediaType,
    /// Handler failure.
    InternalServerError,
    /// Operation not implemented.
    NotImplemented,
    /// Upstream failure while proxying.
    BadGateway,
    /// Server temporarily unable to serve the request.
    ServiceUnavailable,
    /// Upstream timeout while proxying.
    GatewayTimeout,
    /// Proxying not supported.
    ProxyingNotSupported,
}

impl Status {
    const ALL: [Status; 20] = [
        Self::Ok,
        Self::Created,
        Self::Changed,
        Self::Deleted,
        Self::NotModified,
        Self::BadRequest,
        Self::Unauthorized,
        Self::BadOption,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotAllowed,
        Self::NotAcceptable,
        Self::RequestEntityTooLarge,
        Self::UnsupportedMediaType,
        Self::InternalServerError,
        Self::NotImplemented,
        Self::BadGateway,
        Self::ServiceUnavailable,
        Self::GatewayTimeout,
        Self::ProxyingNotSupported,
    ];

    /// Maps the status to its wire code.
    #[must_use]
    pub const fn coap_code(self) -> CoapCode {
        match self {
            Self::Ok => CoapCode::new(2, 5),
            Self::Created => CoapCode::new(2, 1),
            Self::Changed => CoapCode::new(2, 4),
            Self::Deleted => CoapCode::new(2, 2),
            Self::NotModified => CoapCode::new(2, 3),
            Self::BadRequest => CoapCode::new(4, 0),
            Self::Unauthorized => CoapCode::new(4, 1),
            Self::BadOption => CoapCode::new(4, 2),
            Self::Forbidden => CoapCode::new(4, 3),
            Self::NotFound => CoapCode::new(4, 4),
            Self::MethodNotAllowed => CoapCode::new(4, 5),
            Self::NotAcceptable => CoapCode::new(4, 6),
            Self::RequestEntityTooLarge => CoapCode::new(4, 13),
            Self::UnsupportedMediaType => CoapCode::new(4, 15),
            Self::InternalServerError => CoapCode::new(5, 0),
            Self::NotImplemented => CoapCode::new(5, 1),
            Self::BadGateway => CoapCode::new(5, 2),
            Self::ServiceUnavailable => CoapCode::new(5, 3),
            Self::GatewayTimeout => CoapCode::new(5, 4),
            Self::ProxyingNotSupported => CoapCode::new(5, 5),
        }
    }

    /// Maps a wire code back to a status.
    #[must_use]
    pub fn from_coap_code(code: CoapCode) -> Option<Self> {
        let status = Self::ALL
            .into_iter()
            .find(|status| status.coap_code() == code);
        if status.is_none() {
            warn!("invalid wire code {code}");
        }
        status
    }

    /// Checks whether the status signals an error.
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.coap_code().is_error()
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Ok => "Ok",
            Self::Created => "Created",
            Self::Changed => "Changed",
            Self::Deleted => "Deleted",
            Self::NotModified => "Not Modified",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::BadOption => "Bad Option",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NotAcceptable => "Not Acceptable",
            Self::RequestEntityTooLarge => "Request Entity Too Large",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::GatewayTimeout => "Gateway Timeout",
            Self::ProxyingNotSupported => "Proxying Not Supported",
        }
        .fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::{CoapCode, Status};

    #[test]
    fn test_code_parts() {
        let code = CoapCode::new(4, 13);
        assert_eq!(code.class(), 4);
        assert_eq!(code.detail(), 13);
        assert_eq!(alloc::format!("{code}"), "4.13");
        assert!(code.is_error());
        assert!(!CoapCode::new(2, 5).is_error());
    }

    #[test]
    fn test_codes_round_trip() {
        for status in Status::ALL {
            assert_eq!(Status::from_coap_code(status.coap_code()), Some(status));
        }
        assert_eq!(Status::from_coap_code(CoapCode::new(7, 3)), None);
    }

    #[test]
    fn test_error_ordering() {
        // Everything at or above BadRequest is an error and everything
        // below is not; the engine suppresses multicast responses based on
        // this split.
        for status in Status::ALL {
            assert_eq!(status.is_error(), status >= Status::BadRequest);
        }
    }

    #[cfg(feature = "deserialize")]
    #[test]
    fn test_serialization() {
        for status in [Status::Ok, Status::NotModified, Status::Forbidden] {
            assert_eq!(
                crate::deserialize::<Status>(crate::serialize(status)),
                status
            );
        }
    }
}
