//! Request payload compression.

use crate::body::RequestBody;
use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use flate2::write::{DeflateEncoder, GzEncoder};
use http_body::{Body as HttpBody, Frame};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Codec applied to a request payload before it is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum Compression {
    #[default]
    None,
    /// gzip (RFC 1952)
    Gzip,
    /// Raw DEFLATE (RFC 1951), without a zlib wrapper
    Deflate,
}

impl Compression {
    /// Value for the `Content-Encoding` header, `None` when uncompressed.
    #[must_use]
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
            Compression::Deflate => Some("deflate"),
        }
    }
}

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

impl Encoder {
    fn new(compression: Compression) -> Option<Self> {
        let level = flate2::Compression::default();
        match compression {
            Compression::None => None,
            Compression::Gzip => Some(Encoder::Gzip(GzEncoder::new(Vec::new(), level))),
            Compression::Deflate => Some(Encoder::Deflate(DeflateEncoder::new(Vec::new(), level))),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.write_all(data),
            Encoder::Deflate(e) => e.write_all(data),
        }
    }

    /// Flush the trailer. The encoder must not be written to afterwards.
    fn finish(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.try_finish(),
            Encoder::Deflate(e) => e.try_finish(),
        }
    }

    /// Take whatever compressed output has been produced so far.
    fn take_output(&mut self) -> Bytes {
        let out = match self {
            Encoder::Gzip(e) => e.get_mut(),
            Encoder::Deflate(e) => e.get_mut(),
        };
        Bytes::from(std::mem::take(out))
    }
}

/// Compress a buffered payload in one go.
///
/// The encoder is finished before returning, so the output is a complete
/// stream. [`Compression::None`] returns the input unchanged.
///
/// # Errors
/// Returns [`HttpError::Compression`] if the encoder fails; no partial output
/// is returned.
pub fn compress(data: Bytes, compression: Compression) -> Result<Bytes, HttpError> {
    let Some(mut encoder) = Encoder::new(compression) else {
        return Ok(data);
    };
    encoder.write(&data).map_err(HttpError::Compression)?;
    encoder.finish().map_err(HttpError::Compression)?;
    Ok(encoder.take_output())
}

/// Wrap a one-shot body so it is compressed while it is streamed.
pub fn compress_stream(body: RequestBody, compression: Compression) -> RequestBody {
    match Encoder::new(compression) {
        Some(encoder) => CompressBody {
            inner: body,
            encoder: Some(encoder),
        }
        .boxed_unsync(),
        None => body,
    }
}

pin_project! {
    /// Body adapter compressing data frames as they are polled.
    ///
    /// The encoder is finished only when the inner body reports its end, so
    /// the last frame carries the codec trailer.
    struct CompressBody<B> {
        #[pin]
        inner: B,
        encoder: Option<Encoder>,
    }
}

impl<B> HttpBody for CompressBody<B>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let mut this = self.project();
        loop {
            let Some(encoder) = this.encoder.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // Trailers cannot follow a compressed payload; drop them.
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if let Err(e) = encoder.write(&data) {
                        *this.encoder = None;
                        return Poll::Ready(Some(Err(Box::new(HttpError::Compression(e)))));
                    }
                    let out = encoder.take_output();
                    if !out.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(out))));
                    }
                }
                Some(Err(e)) => {
                    *this.encoder = None;
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => {
                    let finished = encoder.finish().map(|()| encoder.take_output());
                    *this.encoder = None;
                    return match finished {
                        Ok(out) if out.is_empty() => Poll::Ready(None),
                        Ok(out) => Poll::Ready(Some(Ok(Frame::data(out)))),
                        Err(e) => Poll::Ready(Some(Err(Box::new(HttpError::Compression(e))))),
                    };
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.encoder.is_none()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::Body;
    use flate2::read::{DeflateDecoder, GzDecoder};
    use std::io::Read;

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    fn inflate(data: &[u8]) -> String {
        let mut out = String::new();
        DeflateDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_content_encoding_names() {
        assert_eq!(Compression::None.content_encoding(), None);
        assert_eq!(Compression::Gzip.content_encoding(), Some("gzip"));
        assert_eq!(Compression::Deflate.content_encoding(), Some("deflate"));
    }

    #[test]
    fn test_none_is_identity() {
        let out = compress(Bytes::from_static(b"abc"), Compression::None).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn test_gzip_output_is_complete() {
        let out = compress(Bytes::from_static(b"compressed payload"), Compression::Gzip).unwrap();
        assert_eq!(&out[..2], [0x1f, 0x8b]);
        assert_eq!(gunzip(&out), "compressed payload");
    }

    #[test]
    fn test_deflate_is_raw() {
        let out = compress(Bytes::from_static(b"raw deflate"), Compression::Deflate).unwrap();
        assert_eq!(inflate(&out), "raw deflate");
    }

    #[tokio::test]
    async fn test_stream_compression_finishes_at_end() {
        let chunks = ["first ", "second ", "third"]
            .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())));
        let Body::Stream(stream) = Body::from_stream(futures_util::stream::iter(chunks)) else {
            panic!("expected a stream body");
        };

        let compressed = compress_stream(stream, Compression::Gzip)
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(gunzip(&compressed), "first second third");
    }

    #[tokio::test]
    async fn test_stream_deflate_of_empty_body() {
        let Body::Stream(stream) =
            Body::from_stream(futures_util::stream::empty::<Result<Bytes, std::io::Error>>())
        else {
            panic!("expected a stream body");
        };

        let compressed = compress_stream(stream, Compression::Deflate)
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(inflate(&compressed), "");
    }
}
