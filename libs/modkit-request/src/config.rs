use http::Method;
use std::time::Duration;

/// Default User-Agent header value, sent when a request names none
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-request/", env!("CARGO_PKG_VERSION"));

/// Default connection establishment timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default limit for bodies read through [`HttpResponse::bytes`](crate::HttpResponse::bytes)
/// and friends
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Where query parameters go for methods that also carry a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryPolicy {
    /// Append the query to the URI for every method; a body is still sent
    #[default]
    AllMethods,
    /// Append the query only for GET and HEAD; ignore it otherwise
    BodylessOnly,
}

impl QueryPolicy {
    /// Whether a query is appended for `method` under this policy.
    #[must_use]
    pub fn applies_to(self, method: &Method) -> bool {
        match self {
            QueryPolicy::AllMethods => true,
            QueryPolicy::BodylessOnly => method == Method::GET || method == Method::HEAD,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection establishment timeout (default: 1 second)
    ///
    /// Covers DNS resolution and the TCP connect. Exceeding it fails the
    /// request with a connect-phase timeout.
    pub connect_timeout: Duration,

    /// Total deadline for a single exchange (default: none)
    ///
    /// Used when a request sets no timeout of its own. Exceeding it cancels
    /// the exchange and fails the request with a request-phase timeout.
    pub request_timeout: Option<Duration>,

    /// Maximum response body size in bytes for buffered reads (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value used when a request sets none
    pub user_agent: String,

    /// Headers added to every request that does not already carry them
    pub default_headers: Vec<(String, String)>,

    /// Query placement for methods with a body (default: `AllMethods`)
    pub query_policy: QueryPolicy,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: Vec::new(),
            query_policy: QueryPolicy::default(),
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Create minimal configuration (small body limit, short request deadline)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
            max_body_size: 1024 * 1024, // 1 MB
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Self::default()
        }
    }

    /// Create configuration for tests against local servers
    ///
    /// Idle connections are not pooled, so a client can be shared between
    /// tests that each run their own runtime.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Some(Duration::from_secs(10)),
            max_body_size: 1024 * 1024, // 1 MB
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 0,
            ..Self::default()
        }
    }
}
