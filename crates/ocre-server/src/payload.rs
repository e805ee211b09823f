use indexmap::IndexMap;

use serde_json::Value;

use tracing::{debug, warn};

use ocre::content::ContentFormat;
use ocre::outcome::{Failure, FailureSet};

use crate::message::ExchangeKey;

/// A request-document decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ended before the document was complete.
    Truncated,
    /// The payload is not a valid document.
    Malformed,
}

/// The generic payload codec consumed by the engine.
///
/// The engine never inspects payload bytes itself: decoding a request
/// body into a document tree and encoding a representation back into
/// bytes both go through this seam.
pub trait PayloadCodec: Send {
    /// Checks whether the codec can decode the given format.
    fn supports(&self, format: ContentFormat) -> bool;

    /// Decodes a request body into a document.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] for an incomplete payload and
    /// [`DecodeError::Malformed`] for anything else undecodable.
    fn decode(&self, bytes: &[u8], format: ContentFormat) -> Result<Value, DecodeError>;

    /// Encodes a document into response bytes, returning the format used.
    fn encode(&self, document: &Value, accept: ContentFormat) -> (Vec<u8>, ContentFormat);
}

/// A [`PayloadCodec`] carrying documents as `JSON`.
///
/// An undefined content format is treated as `JSON`, so requests without
/// a content-format option stay decodable.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn supports(&self, format: ContentFormat) -> bool {
        matches!(format, ContentFormat::Json | ContentFormat::Undefined)
    }

    fn decode(&self, bytes: &[u8], _format: ContentFormat) -> Result<Value, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| {
            if e.is_eof() {
                DecodeError::Truncated
            } else {
                DecodeError::Malformed
            }
        })
    }

    fn encode(&self, document: &Value, _accept: ContentFormat) -> (Vec<u8>, ContentFormat) {
        (
            serde_json::to_vec(document).unwrap_or_default(),
            ContentFormat::Json,
        )
    }
}

// Decodes the request body into a document, mapping failures onto the
// admission outcome: any decode failure is a bad request, and truncation
// additionally marks the payload as too large.
pub(crate) fn decode_document(
    codec: &dyn PayloadCodec,
    payload: &[u8],
    format: ContentFormat,
) -> Result<Option<Value>, FailureSet> {
    if payload.is_empty() {
        return Ok(None);
    }
    match codec.decode(payload, format) {
        Ok(document) => Ok(Some(document)),
        Err(DecodeError::Truncated) => {
            warn!("request payload truncated");
            Err(FailureSet::init(Failure::BadRequest).insert(Failure::EntityTooLarge))
        }
        Err(DecodeError::Malformed) => {
            warn!("undecodable request payload");
            Err(FailureSet::init(Failure::BadRequest))
        }
    }
}

/// The pool of response buffers shared with the block-wise transfer
/// collaborator.
///
/// A buffer is keyed by the exchange it serves. Continued block-wise
/// exchanges reuse the buffer allocated by the first block; exchanges
/// whose representation fits a single transfer unit release theirs as
/// soon as the response is composed.
#[derive(Debug)]
pub struct ResponseBuffers {
    buffers: IndexMap<ExchangeKey, Vec<u8>>,
    block_size: u16,
    max_size: usize,
}

impl ResponseBuffers {
    pub(crate) fn new(block_size: u16, max_size: usize) -> Self {
        Self {
            buffers: IndexMap::new(),
            block_size,
            max_size,
        }
    }

    /// Returns the negotiated block size.
    #[must_use]
    pub const fn block_size(&self) -> u16 {
        self.block_size
    }

    // Fills the exchange's buffer, allocating or reusing it. Payloads
    // beyond the buffering limit degrade to an entity-too-large failure
    // instead of exhausting the pool.
    pub(crate) fn fill(&mut self, key: &ExchangeKey, bytes: Vec<u8>) -> Result<&[u8], FailureSet> {
        if bytes.len() > self.max_size {
            warn!(
                "response payload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_size
            );
            return Err(FailureSet::init(Failure::EntityTooLarge));
        }
        let buffer = match self.buffers.entry(key.clone()) {
            indexmap::map::Entry::Occupied(entry) => {
                debug!("reusing response buffer");
                let buffer = entry.into_mut();
                buffer.clear();
                buffer
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(Vec::with_capacity(usize::from(self.block_size)))
            }
        };
        buffer.extend_from_slice(&bytes);
        Ok(buffer)
    }

    // Releases the buffer of a completed exchange.
    pub(crate) fn release(&mut self, key: &ExchangeKey) {
        self.buffers.shift_remove(key);
    }

    pub(crate) fn clear(&mut self) {
        self.buffers.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }
}
