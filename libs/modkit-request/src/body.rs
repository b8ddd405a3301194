//! Request payloads and their normalization into transport bodies.

use crate::error::{BoxError, HttpError};
use crate::json::JsonSource;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Body type handed to the transport.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Content type set for [`Body::Json`] when the request names none.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Request payload.
///
/// Every kind except [`Body::Stream`] can be normalized repeatedly, which is
/// what allows a redirected request to resend its body.
#[derive(Default)]
pub enum Body {
    /// No payload at all. Distinct from an empty [`Body::Bytes`].
    #[default]
    Absent,
    /// UTF-8 text sent as-is.
    Text(String),
    /// Raw bytes sent as-is.
    Bytes(Bytes),
    /// One-shot byte source, consumed by the first exchange.
    Stream(RequestBody),
    /// Structured value serialized to JSON for every exchange.
    Json(Arc<dyn JsonSource>),
}

/// A [`Body`] ready for compression and dispatch.
pub enum NormalizedBody {
    Absent,
    Buffered(Bytes),
    Streaming(RequestBody),
}

impl Body {
    /// Structured payload serialized as JSON when the request is sent.
    #[must_use]
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Body::Json(Arc::new(value))
    }

    /// One-shot payload produced by a fallible byte stream.
    #[must_use]
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let frames = stream.map_ok(Frame::data).map_err(Into::<BoxError>::into);
        Body::Stream(StreamBody::new(frames).boxed_unsync())
    }

    /// One-shot payload read from an async reader until EOF.
    #[must_use]
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::from_stream(ReaderStream::new(reader))
    }

    /// One-shot payload backed by any `http_body::Body`.
    #[must_use]
    pub fn from_http_body<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Body::Stream(body.map_err(Into::<BoxError>::into).boxed_unsync())
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Body::Absent)
    }

    /// Whether the payload can be produced again for a follow-up exchange.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Body::Stream(_))
    }

    /// Content type implied by the payload kind, if any.
    pub(crate) fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Body::Json(_) => Some(JSON_CONTENT_TYPE),
            _ => None,
        }
    }

    /// Produce the bytes (or stream) to send for one exchange.
    ///
    /// A [`Body::Stream`] is moved out and leaves [`Body::Absent`] behind.
    ///
    /// # Errors
    /// Returns [`HttpError::BodyEncoding`] if a structured value cannot be
    /// serialized, including values holding `NaN` or infinite floats.
    pub fn normalize(&mut self) -> Result<NormalizedBody, HttpError> {
        match self {
            Body::Absent => Ok(NormalizedBody::Absent),
            Body::Text(text) => Ok(NormalizedBody::Buffered(Bytes::from(text.clone()))),
            Body::Bytes(bytes) => Ok(NormalizedBody::Buffered(bytes.clone())),
            Body::Json(value) => value
                .to_json_vec()
                .map(|encoded| NormalizedBody::Buffered(Bytes::from(encoded)))
                .map_err(HttpError::BodyEncoding),
            Body::Stream(_) => match std::mem::take(self) {
                Body::Stream(stream) => Ok(NormalizedBody::Streaming(stream)),
                _ => Ok(NormalizedBody::Absent),
            },
        }
    }
}

impl NormalizedBody {
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, NormalizedBody::Absent)
    }

    /// Convert into the boxed body type the transport accepts.
    #[must_use]
    pub fn into_request_body(self) -> RequestBody {
        match self {
            NormalizedBody::Absent => empty_body(),
            NormalizedBody::Buffered(bytes) => full_body(bytes),
            NormalizedBody::Streaming(stream) => stream,
        }
    }
}

pub fn empty_body() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn full_body(bytes: Bytes) -> RequestBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Absent => f.write_str("Absent"),
            Body::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
            Body::Json(_) => f.write_str("Json(..)"),
        }
    }
}

impl fmt::Debug for NormalizedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedBody::Absent => f.write_str("Absent"),
            NormalizedBody::Buffered(bytes) => {
                f.debug_tuple("Buffered").field(&bytes.len()).finish()
            }
            NormalizedBody::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}
