use crate::decompression::{ContentCoding, RawBody, ResponseBody};
use crate::error::HttpError;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Response, StatusCode, Version};
use http_body::{Body as _, Frame};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Body wrapper that enforces a size limit while streaming.
    ///
    /// Created by [`HttpResponse::into_limited_body()`]. Counts decoded bytes
    /// and yields [`HttpError::BodyTooLarge`] once the limit is exceeded, so a
    /// small compressed payload cannot expand without bound.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use http_body_util::BodyExt;
    ///
    /// let response = Request::get("https://example.com/large-file").send().await?;
    /// let mut body = response.into_limited_body();
    ///
    /// while let Some(frame) = body.frame().await {
    ///     let frame = frame?;
    ///     if let Some(chunk) = frame.data_ref() {
    ///         process_chunk(chunk);
    ///     }
    /// }
    /// ```
    #[derive(Debug)]
    pub struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    #[must_use]
    pub fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    /// Decoded bytes yielded so far.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

/// Response of the final exchange of a logical request.
///
/// The body is read at most once: [`bytes`](Self::bytes),
/// [`text`](Self::text) and [`json`](Self::json) consume the response and
/// enforce the client's `max_body_size`. The status is never checked; a 4xx or
/// 5xx response is returned like any other.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    content_length: Option<u64>,
    url: String,
    body: ResponseBody,
    max_body_size: usize,
}

impl HttpResponse {
    /// Wrap a transport response, attaching a decoder when the response
    /// declares a supported `Content-Encoding`.
    ///
    /// # Errors
    /// Returns `HttpError::Decompression` if a gzip body has an invalid header.
    pub(crate) async fn from_raw(
        response: Response<RawBody>,
        url: String,
        max_body_size: usize,
    ) -> Result<Self, HttpError> {
        let (parts, raw) = response.into_parts();
        let content_length = declared_length(&parts.headers).or_else(|| raw.size_hint().exact());
        let body = ResponseBody::wrap(raw, ContentCoding::detect(&parts.headers)).await?;

        Ok(Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            content_length,
            url,
            body,
            max_body_size,
        })
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Length declared by the server, before any decoding. `None` when unknown.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// URL of the exchange that produced this response, after redirects.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Read the whole (decoded) body.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if the body exceeds `max_body_size`,
    /// `HttpError::Decompression` or `HttpError::BodyRead` if reading fails.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.body, self.max_body_size).await
    }

    /// Read the body as UTF-8 text; invalid sequences are replaced.
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Read the body and deserialize it as JSON.
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes), plus `HttpError::Json` if parsing fails.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(HttpError::Json)
    }

    /// The body as a stream, without the size limit.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// The body as a stream that enforces `max_body_size`.
    #[must_use]
    pub fn into_limited_body(self) -> LimitedBody {
        LimitedBody::new(self.body, self.max_body_size)
    }

    #[must_use]
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Release the body without reading the rest of it.
    ///
    /// # Errors
    /// Returns `HttpError::Decompression` if decoding failed during an
    /// earlier read.
    pub fn close(self) -> Result<(), HttpError> {
        self.body.close()
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn read_body_limited(mut body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use flate2::Compression as Level;
    use flate2::write::GzEncoder;
    use http_body_util::{Empty, Full, StreamBody};
    use std::io::Write;

    fn raw(data: impl Into<Bytes>) -> RawBody {
        Full::new(data.into())
            .map_err(|never| match never {})
            .boxed()
    }

    async fn response(
        headers: &[(&str, &str)],
        body: RawBody,
        limit: usize,
    ) -> Result<HttpResponse, HttpError> {
        let mut builder = Response::builder().status(StatusCode::OK);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        HttpResponse::from_raw(
            builder.body(body).unwrap(),
            "http://localhost/".to_owned(),
            limit,
        )
        .await
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_content_length_from_header() {
        let response = response(&[("content-length", "5")], raw("hello"), 1024)
            .await
            .unwrap();
        assert_eq!(response.content_length(), Some(5));
        assert_eq!(response.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_content_length_unknown_for_streamed_body() {
        let chunks: Vec<Result<Frame<Bytes>, BoxError>> =
            vec![Ok(Frame::data(Bytes::from_static(b"ab")))];
        let body = StreamBody::new(futures_util::stream::iter(chunks)).boxed();

        let response = response(&[], body, 1024).await.unwrap();
        assert_eq!(response.content_length(), None);
        assert_eq!(response.bytes().await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_content_length_of_empty_body() {
        let body = Empty::<Bytes>::new().map_err(|never| match never {}).boxed();
        let response = response(&[], body, 1024).await.unwrap();
        assert_eq!(response.content_length(), Some(0));
    }

    #[tokio::test]
    async fn test_gzip_body_decoded_and_length_is_declared() {
        let compressed = gzip(b"{\"n\":3}");
        let length = compressed.len().to_string();
        let response = response(
            &[("content-encoding", "gzip"), ("content-length", &length)],
            raw(compressed.clone()),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(response.content_length(), Some(compressed.len() as u64));
        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value["n"], 3);
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let response = response(&[], raw(vec![b'x'; 64]), 16).await.unwrap();
        let err = response.bytes().await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::BodyTooLarge {
                limit: 16,
                actual: 64
            }
        ));
    }

    #[tokio::test]
    async fn test_limit_applies_to_decoded_size() {
        let compressed = gzip(&[b'a'; 4096]);
        assert!(compressed.len() < 100);
        let response = response(&[("content-encoding", "gzip")], raw(compressed), 100)
            .await
            .unwrap();

        let err = response.bytes().await.unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 100, .. }));
    }

    #[tokio::test]
    async fn test_limited_body_stream() {
        let response = response(&[], raw(vec![b'x'; 10]), 4).await.unwrap();
        let mut body = response.into_limited_body();
        assert_eq!(body.limit(), 4);

        let err = body.frame().await.unwrap().unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { .. }));
        assert_eq!(body.bytes_read(), 10);
    }

    #[tokio::test]
    async fn test_body_mut_reads_ahead_of_buffered_read() {
        let chunks: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"head;"))),
            Ok(Frame::data(Bytes::from_static(b"rest"))),
        ];
        let body = StreamBody::new(futures_util::stream::iter(chunks)).boxed();
        let mut response = response(&[], body, 1024).await.unwrap();

        let first = response.body_mut().frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "head;");
        assert_eq!(response.bytes().await.unwrap(), "rest");
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let response = response(&[], raw("not json"), 1024).await.unwrap();
        let err = response.json::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, HttpError::Json(_)));
    }

    #[tokio::test]
    async fn test_text_replaces_invalid_utf8() {
        let response = response(&[], raw(vec![b'o', b'k', 0xff]), 1024)
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_close_unread() {
        let response = response(&[("content-encoding", "gzip")], raw(gzip(b"data")), 1024)
            .await
            .unwrap();
        assert_eq!(response.url(), "http://localhost/");
        response.close().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_gzip_fails_construction() {
        let err = response(&[("content-encoding", "gzip")], raw("plain text body"), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Decompression(_)));
    }
}
