use std::net::SocketAddr;

use serde_json::Value;

use ocre::content::ContentFormat;
use ocre::method::Method;
use ocre::status::CoapCode;

use crate::endpoint::Endpoint;

/// An exchange token chosen by the requester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Token(Vec<u8>);

impl Token {
    /// Creates a [`Token`] from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the token bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes().to_vec())
    }
}

/// The identity of an exchange: requester address plus token.
///
/// Deferred responses and block-wise response buffers are keyed by this
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    /// Requester address.
    pub address: SocketAddr,
    /// Exchange token.
    pub token: Token,
}

impl ExchangeKey {
    /// Creates an [`ExchangeKey`] for a request arriving from an endpoint.
    #[must_use]
    pub fn new(request: &CoapRequest, endpoint: &Endpoint) -> Self {
        Self {
            address: endpoint.address(),
            token: request.token.clone(),
        }
    }
}

/// A decoded request, as handed over by the wire-format collaborator.
#[derive(Debug, Clone)]
pub struct CoapRequest {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Exchange token.
    pub token: Token,
    /// Content format of the request payload.
    pub content_format: ContentFormat,
    /// Requested response format.
    pub accept: ContentFormat,
    /// Observe option, when present.
    pub observe: Option<u32>,
    /// Conditional version tag, when present.
    pub etag: Option<u64>,
    /// Raw request payload.
    pub payload: Vec<u8>,
    /// Negotiated block size for the response, when block-wise transfer
    /// is in use.
    pub block2_size: Option<u16>,
}

impl CoapRequest {
    /// Creates a `GET` request for the given path.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::init(Method::Get, path)
    }

    /// Creates a `PUT` request for the given path.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::init(Method::Put, path)
    }

    /// Creates a `POST` request for the given path.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::init(Method::Post, path)
    }

    /// Creates a `DELETE` request for the given path.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::init(Method::Delete, path)
    }

    /// Sets the query string.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the exchange token.
    #[must_use]
    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets a `JSON` document as the request payload.
    #[must_use]
    pub fn json_payload(mut self, document: &Value) -> Self {
        self.payload = serde_json::to_vec(document).unwrap_or_default();
        self.content_format = ContentFormat::Json;
        self
    }

    /// Sets a raw payload with its content format.
    #[must_use]
    pub fn payload(mut self, payload: impl Into<Vec<u8>>, format: ContentFormat) -> Self {
        self.payload = payload.into();
        self.content_format = format;
        self
    }

    /// Sets the requested response format.
    #[must_use]
    pub const fn accept(mut self, format: ContentFormat) -> Self {
        self.accept = format;
        self
    }

    /// Sets the observe option.
    #[must_use]
    pub const fn observe(mut self, observe: u32) -> Self {
        self.observe = Some(observe);
        self
    }

    /// Sets the conditional version tag.
    #[must_use]
    pub const fn etag(mut self, etag: u64) -> Self {
        self.etag = Some(etag);
        self
    }

    /// Sets the negotiated response block size.
    #[must_use]
    pub const fn block2_size(mut self, size: u16) -> Self {
        self.block2_size = Some(size);
        self
    }

    fn init(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            token: Token::default(),
            content_format: ContentFormat::Undefined,
            accept: ContentFormat::Undefined,
            observe: None,
            etag: None,
            payload: Vec::new(),
            block2_size: None,
        }
    }
}

/// A composed response, ready for the wire-format collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapResponse {
    /// Response code.
    pub code: CoapCode,
    /// Response payload.
    pub payload: Vec<u8>,
    /// Content format of the response payload.
    pub content_format: ContentFormat,
    /// Version tag of the returned representation.
    pub etag: Option<u64>,
    /// Observe option echoed on successful registrations.
    pub observe: Option<u32>,
    /// Block size hint attached to entity-too-large rejections.
    pub size1: Option<u32>,
}

impl CoapResponse {
    pub(crate) const fn new(code: CoapCode) -> Self {
        Self {
            code,
            payload: Vec::new(),
            content_format: ContentFormat::Undefined,
            etag: None,
            observe: None,
            size1: None,
        }
    }

    /// Decodes the payload as a `JSON` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid `JSON`.
    pub fn json(&self) -> crate::error::Result<Value> {
        serde_json::from_slice(&self.payload).map_err(Into::into)
    }
}

/// The instruction handed to the transport collaborator after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Send the composed response.
    Respond(CoapResponse),
    /// Clear the exchange without responding.
    Drop,
    /// Acknowledge and wait: the response will be produced out of band
    /// once the slow handler completes.
    Deferred,
}

impl Disposition {
    /// Returns the composed response, if any.
    #[must_use]
    pub const fn response(&self) -> Option<&CoapResponse> {
        match self {
            Self::Respond(response) => Some(response),
            Self::Drop | Self::Deferred => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use ocre::content::ContentFormat;
    use ocre::method::Method;

    use serde_json::json;

    use super::{CoapRequest, Token};

    #[test]
    fn test_request_builder() {
        let request = CoapRequest::put("/light")
            .query("if=oic.if.rw")
            .token(7_u64)
            .json_payload(&json!({"on": true}));

        assert_eq!(request.method, Method::Put);
        assert_eq!(request.content_format, ContentFormat::Json);
        assert_eq!(request.token, Token::from(7));
        assert!(!request.payload.is_empty());
    }
}
