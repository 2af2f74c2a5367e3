//! Bodies uploaded through the engine's send buffer.

use crate::base::neterror::BridgeError;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;

/// Largest slice of a buffered body handed to the engine in one write.
pub const WRITE_CHUNK_SIZE: usize = 16 * 1024;

/// Stream of body chunks produced by the caller.
pub type BodyStream = BoxStream<'static, Result<Bytes, BridgeError>>;

/// What an exchange uploads after the request head.
#[derive(Default)]
pub enum RequestBody {
    /// The engine is told there is no body.
    #[default]
    Empty,
    /// Fully buffered; written in [`WRITE_CHUNK_SIZE`] slices.
    Bytes(Bytes),
    /// Body produced incrementally. A producer error ends the body early.
    Stream(BodyStream),
    /// Written by the caller through
    /// [`Exchange::outbound`](crate::http::exchange::Exchange::outbound),
    /// which must also complete it.
    Writer,
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            RequestBody::Stream(_) => f.write_str("Stream"),
            RequestBody::Writer => f.write_str("Writer"),
        }
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(Bytes::from(s.to_owned()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl RequestBody {
    /// Wrap a chunk stream.
    pub fn wrap_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BridgeError>> + Send + 'static,
    {
        RequestBody::Stream(stream.boxed())
    }

    /// True when nothing would be uploaded.
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Bytes(b) => b.is_empty(),
            RequestBody::Stream(_) | RequestBody::Writer => false,
        }
    }

    /// Length in bytes, when known up front.
    pub fn len(&self) -> Option<usize> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(b) => Some(b.len()),
            RequestBody::Stream(_) | RequestBody::Writer => None,
        }
    }

    /// The chunk stream the outbound pump writes, or `None` when the
    /// caller writes the body itself. Buffered bodies are sliced into
    /// [`WRITE_CHUNK_SIZE`] pieces.
    pub(crate) fn into_stream(self) -> Option<BodyStream> {
        let stream = match self {
            RequestBody::Writer => return None,
            RequestBody::Empty => stream::empty().boxed(),
            RequestBody::Bytes(mut b) => {
                let mut chunks = Vec::with_capacity(b.len() / WRITE_CHUNK_SIZE + 1);
                while !b.is_empty() {
                    let at = b.len().min(WRITE_CHUNK_SIZE);
                    chunks.push(Ok(b.split_to(at)));
                }
                stream::iter(chunks).boxed()
            }
            RequestBody::Stream(s) => s,
        };
        Some(stream)
    }
}
