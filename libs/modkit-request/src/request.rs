use crate::body::Body;
use crate::client::default_client;
use crate::compression::Compression;
use crate::error::HttpError;
use crate::multipart::MultipartForm;
use crate::query::Query;
use crate::response::HttpResponse;
use http::header::{HeaderName, HeaderValue};
use http::Method;
use serde::Serialize;
use std::time::Duration;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Declarative description of one logical HTTP request
///
/// Built fluently, then executed with [`send()`](Request::send) (process
/// default client) or [`HttpClient::execute`](crate::HttpClient::execute).
/// Invalid methods and headers do not fail the builder; the first such error
/// is kept and returned by `send`/`execute` before any I/O.
///
/// # Headers
///
/// [`header`](Request::header) appends, so the same name may be sent several
/// times. The single-value setters ([`content_type`](Request::content_type),
/// [`accept`](Request::accept), [`user_agent`](Request::user_agent)) replace
/// any same-named entry added through `header`.
///
/// # Example
///
/// ```ignore
/// use modkit_request::{Compression, QueryValues, Request};
///
/// let mut query = QueryValues::new();
/// query.add("limit", "3");
///
/// let response = Request::post("https://api.example.com/items")
///     .query(query)
///     .json(NewItem { name: "widget" })
///     .compression(Compression::Gzip)
///     .header("x-request-id", "abc123")
///     .max_redirects(3)
///     .send()
///     .await?;
/// ```
#[must_use = "Request does nothing until it is sent"]
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: String,
    pub(crate) body: Body,
    pub(crate) query: Option<Query>,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) content_type: Option<HeaderValue>,
    pub(crate) accept: Option<HeaderValue>,
    pub(crate) host: Option<HeaderValue>,
    pub(crate) user_agent: Option<HeaderValue>,
    pub(crate) insecure: bool,
    pub(crate) max_redirects: u32,
    pub(crate) compression: Compression,
    pub(crate) timeout: Option<Duration>,
    /// First error captured while building, returned on send
    pub(crate) error: Option<HttpError>,
}

impl Request {
    /// Create a request with a method name.
    ///
    /// An empty method means GET. A method that is not a valid HTTP token is
    /// reported when the request is sent.
    pub fn new(method: &str, uri: impl Into<String>) -> Self {
        let (method, error) = if method.is_empty() {
            (Method::GET, None)
        } else {
            match Method::from_bytes(method.as_bytes()) {
                Ok(method) => (method, None),
                Err(e) => (Method::GET, Some(HttpError::InvalidMethod(e))),
            }
        };
        Self {
            error,
            ..Self::with_method(method, uri)
        }
    }

    /// Create a request with an already parsed method.
    pub fn with_method(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            body: Body::Absent,
            query: None,
            headers: Vec::new(),
            content_type: None,
            accept: None,
            host: None,
            user_agent: None,
            insecure: false,
            max_redirects: 0,
            compression: Compression::None,
            timeout: None,
            error: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::with_method(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::with_method(Method::POST, uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Self::with_method(Method::PUT, uri)
    }

    pub fn patch(uri: impl Into<String>) -> Self {
        Self::with_method(Method::PATCH, uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::with_method(Method::DELETE, uri)
    }

    pub fn head(uri: impl Into<String>) -> Self {
        Self::with_method(Method::HEAD, uri)
    }

    pub fn options(uri: impl Into<String>) -> Self {
        Self::with_method(Method::OPTIONS, uri)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Set the payload.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Send `value` as JSON.
    ///
    /// The value is serialized when the request is sent, and again for every
    /// followed redirect. `Content-Type: application/json` is added unless a
    /// content type is set.
    pub fn json<T>(mut self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body = Body::json(value);
        self
    }

    /// Send URL-encoded form fields.
    ///
    /// Sets `Content-Type: application/x-www-form-urlencoded` unless a content
    /// type is already set. Fields that cannot be form-encoded (nested
    /// sequences or maps) leave a deferred [`HttpError::FormEncode`].
    pub fn form<T: Serialize + ?Sized>(mut self, fields: &T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_urlencoded::to_string(fields) {
            Ok(encoded) => {
                self.body = Body::Text(encoded);
                if self.content_type.is_none() {
                    self.content_type = Some(HeaderValue::from_static(FORM_CONTENT_TYPE));
                }
            }
            Err(e) => self.error = Some(HttpError::FormEncode(e)),
        }
        self
    }

    /// Send a `multipart/form-data` payload.
    ///
    /// Sets the matching content type, with its boundary, unless a content
    /// type is already set.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        let (payload, content_type) = form.into_parts();
        self.body = Body::Bytes(payload);
        if self.content_type.is_none() {
            self.set_single(content_type.as_str(), |r, v| r.content_type = Some(v));
        }
        self
    }

    /// Attach query parameters; see [`Query`].
    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Attach the fields of a serializable record as query parameters.
    pub fn query_record<T>(self, record: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.query(Query::record(record))
    }

    /// Append a header. Repeating a name sends it several times.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.push((name, value));
            }
            (Err(e), _) => {
                self.error = Some(HttpError::InvalidHeaderName(e));
            }
            (_, Err(e)) => {
                self.error = Some(HttpError::InvalidHeaderValue(e));
            }
        }
        self
    }

    /// Append several headers in order.
    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        headers
            .into_iter()
            .fold(self, |request, (name, value)| {
                request.header(name.as_ref(), value.as_ref())
            })
    }

    pub fn content_type(mut self, value: &str) -> Self {
        self.set_single(value, |r, v| r.content_type = Some(v));
        self
    }

    pub fn accept(mut self, value: &str) -> Self {
        self.set_single(value, |r, v| r.accept = Some(v));
        self
    }

    /// Override the `Host` header sent to the server.
    pub fn host(mut self, value: &str) -> Self {
        self.set_single(value, |r, v| r.host = Some(v));
        self
    }

    /// Override the client's default `User-Agent` for this request.
    pub fn user_agent(mut self, value: &str) -> Self {
        self.set_single(value, |r, v| r.user_agent = Some(v));
        self
    }

    /// Skip TLS certificate verification for this request only.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Follow up to `max` redirects (301, 302, 303, 307). Default: 0.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Compress the payload before sending it. Ignored without a body.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Deadline for each exchange, from dispatch to response headers.
    ///
    /// A zero duration means no per-request deadline; the client's
    /// `request_timeout` applies instead.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn set_single(&mut self, value: &str, set: impl FnOnce(&mut Self, HeaderValue)) {
        if self.error.is_some() {
            return;
        }
        match HeaderValue::try_from(value) {
            Ok(value) => set(self, value),
            Err(e) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
    }

    /// Send the request through the process default client.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - a method or header given to the builder was invalid
    /// - the body or query could not be encoded
    /// - the URL is invalid
    /// - the transport failed or a deadline expired
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        default_client()?.execute(self).await
    }
}
