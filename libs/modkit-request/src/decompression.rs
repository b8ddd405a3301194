//! Response body decoding driven by `Content-Encoding`.

use crate::error::{BoxError, HttpError};
use bytes::{Bytes, BytesMut};
use flate2::write::{DeflateDecoder, MultiGzDecoder};
use http::HeaderMap;
use http::header::CONTENT_ENCODING;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use std::fmt;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Body type returned by the transport.
pub type RawBody = BoxBody<Bytes, BoxError>;

const GZIP_HEADER_LEN: usize = 10;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_METHOD_DEFLATE: u8 = 8;

/// Response content codings understood by [`ResponseBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// Detect the coding from a `Content-Encoding` header.
    ///
    /// Matching is a case-insensitive substring test; `deflate` is checked
    /// before `gzip`.
    #[must_use]
    pub fn detect(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(CONTENT_ENCODING)?.to_str().ok()?;
        let value = value.to_ascii_lowercase();
        if value.contains("deflate") {
            Some(ContentCoding::Deflate)
        } else if value.contains("gzip") {
            Some(ContentCoding::Gzip)
        } else {
            None
        }
    }
}

enum Decoder {
    Gzip(MultiGzDecoder<Vec<u8>>),
    Deflate(DeflateDecoder<Vec<u8>>),
}

impl Decoder {
    fn new(coding: ContentCoding) -> Self {
        match coding {
            ContentCoding::Gzip => Decoder::Gzip(MultiGzDecoder::new(Vec::new())),
            ContentCoding::Deflate => Decoder::Deflate(DeflateDecoder::new(Vec::new())),
        }
    }

    fn coding(&self) -> ContentCoding {
        match self {
            Decoder::Gzip(_) => ContentCoding::Gzip,
            Decoder::Deflate(_) => ContentCoding::Deflate,
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Decoder::Gzip(d) => {
                d.write_all(data)?;
                d.flush()
            }
            Decoder::Deflate(d) => {
                d.write_all(data)?;
                d.flush()
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self {
            Decoder::Gzip(d) => d.try_finish(),
            Decoder::Deflate(d) => d.try_finish(),
        }
    }

    fn take_output(&mut self) -> Bytes {
        let out = match self {
            Decoder::Gzip(d) => d.get_mut(),
            Decoder::Deflate(d) => d.get_mut(),
        };
        Bytes::from(std::mem::take(out))
    }
}

/// Single-pass response body, decoded when the response declared a
/// supported `Content-Encoding`.
///
/// When a decoder is attached it is the only read path. Dropping or
/// [closing](ResponseBody::close) the body releases the decoder before the
/// underlying transport body.
pub struct ResponseBody {
    decoder: Option<Decoder>,
    pending: Option<Bytes>,
    raw: RawBody,
    decoded_to_end: bool,
    decode_error: Option<io::Error>,
}

impl ResponseBody {
    fn plain(raw: RawBody) -> Self {
        Self {
            decoder: None,
            pending: None,
            raw,
            decoded_to_end: false,
            decode_error: None,
        }
    }

    /// Attach a decoder for `coding` to `raw`.
    ///
    /// For gzip the stream header is read and validated here, so a body that
    /// is not gzip fails before the caller sees the response. An empty body
    /// stays empty. Deflate errors surface on the first failing read.
    ///
    /// # Errors
    /// Returns [`HttpError::Decompression`] for an invalid gzip header and
    /// [`HttpError::BodyRead`] if the transport fails while it is read.
    pub(crate) async fn wrap(
        raw: RawBody,
        coding: Option<ContentCoding>,
    ) -> Result<Self, HttpError> {
        match coding {
            None => Ok(Self::plain(raw)),
            Some(ContentCoding::Deflate) => Ok(Self {
                decoder: Some(Decoder::new(ContentCoding::Deflate)),
                ..Self::plain(raw)
            }),
            Some(ContentCoding::Gzip) => Self::gzip(raw).await,
        }
    }

    async fn gzip(mut raw: RawBody) -> Result<Self, HttpError> {
        let mut header = BytesMut::new();
        while header.len() < GZIP_HEADER_LEN {
            match raw.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        header.extend_from_slice(&data);
                    }
                }
                Some(Err(e)) => return Err(HttpError::BodyRead(e)),
                None => break,
            }
        }

        if header.is_empty() {
            return Ok(Self::plain(raw));
        }
        validate_gzip_header(&header).map_err(HttpError::Decompression)?;

        let mut decoder = Decoder::new(ContentCoding::Gzip);
        decoder.write(&header).map_err(HttpError::Decompression)?;
        let first = decoder.take_output();

        Ok(Self {
            decoder: Some(decoder),
            pending: (!first.is_empty()).then_some(first),
            ..Self::plain(raw)
        })
    }

    /// The coding being decoded, if any.
    #[must_use]
    pub fn content_coding(&self) -> Option<ContentCoding> {
        self.decoder.as_ref().map(Decoder::coding)
    }

    /// Release the body.
    ///
    /// The decoder is dropped first, then the raw transport body.
    ///
    /// # Errors
    /// Returns [`HttpError::Decompression`] if decoding already failed while
    /// the body was read.
    pub fn close(self) -> Result<(), HttpError> {
        let ResponseBody {
            decoder,
            raw,
            decode_error,
            ..
        } = self;
        drop(decoder);
        drop(raw);
        decode_error.map_or(Ok(()), |e| Err(HttpError::Decompression(e)))
    }

    fn decode_failed(&mut self, err: io::Error) -> HttpError {
        self.decoded_to_end = true;
        self.decode_error = Some(io::Error::new(err.kind(), err.to_string()));
        HttpError::Decompression(err)
    }
}

fn validate_gzip_header(header: &[u8]) -> io::Result<()> {
    if header.len() < GZIP_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated gzip header",
        ));
    }
    if header[..2] != GZIP_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid gzip header",
        ));
    }
    if header[2] != GZIP_METHOD_DEFLATE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported gzip compression method",
        ));
    }
    Ok(())
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, HttpError>>> {
        let this = self.get_mut();

        if let Some(pending) = this.pending.take() {
            return Poll::Ready(Some(Ok(Frame::data(pending))));
        }

        let Some(decoder) = this.decoder.as_mut() else {
            return Pin::new(&mut this.raw)
                .poll_frame(cx)
                .map_err(HttpError::BodyRead);
        };

        if this.decoded_to_end {
            return Poll::Ready(None);
        }

        loop {
            match ready!(Pin::new(&mut this.raw).poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        if let Err(e) = decoder.write(&data) {
                            return Poll::Ready(Some(Err(this.decode_failed(e))));
                        }
                        let out = decoder.take_output();
                        if !out.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(out))));
                        }
                    }
                    Err(trailers) => return Poll::Ready(Some(Ok(trailers))),
                },
                Some(Err(e)) => return Poll::Ready(Some(Err(HttpError::BodyRead(e)))),
                None => {
                    if let Err(e) = decoder.finish() {
                        return Poll::Ready(Some(Err(this.decode_failed(e))));
                    }
                    this.decoded_to_end = true;
                    let out = decoder.take_output();
                    return if out.is_empty() {
                        Poll::Ready(None)
                    } else {
                        Poll::Ready(Some(Ok(Frame::data(out))))
                    };
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        if self.pending.is_some() {
            return false;
        }
        if self.decoder.is_some() {
            self.decoded_to_end
        } else {
            self.raw.is_end_stream()
        }
    }

    fn size_hint(&self) -> SizeHint {
        if self.decoder.is_some() {
            SizeHint::default()
        } else {
            self.raw.size_hint()
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("coding", &self.content_coding())
            .field("decoded_to_end", &self.decoded_to_end)
            .finish_non_exhaustive()
    }
}
