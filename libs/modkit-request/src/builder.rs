use crate::client::HttpClient;
use crate::config::{HttpClientConfig, QueryPolicy, TlsRootConfig};
use crate::error::HttpError;
use crate::transport::{HyperTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`HttpClient`].
///
/// Without an injected [`Transport`], [`build`](Self::build) creates a
/// [`HyperTransport`] from the accumulated configuration.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Set the connection establishment timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the total deadline applied to requests that carry none.
    ///
    /// A zero duration removes the deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request that does not set it itself.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Set the maximum response body size for buffered reads
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn query_policy(mut self, policy: QueryPolicy) -> Self {
        self.config.query_policy = policy;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set the idle timeout for pooled connections
    ///
    /// Set to `None` to use hyper-util's default.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    ///
    /// `0` disables connection reuse.
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Use `transport` for every exchange instead of a pooled hyper client.
    ///
    /// Connect timeout, TLS roots, pool settings, user agent, and default
    /// headers are the transport's business and are not applied to it.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if TLS initialization fails, or a header error
    /// if the user agent or a default header is invalid.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(&self.config)?),
        };

        tracing::debug!(
            connect_timeout = ?self.config.connect_timeout,
            request_timeout = ?self.config.request_timeout,
            query_policy = ?self.config.query_policy,
            "built HTTP client"
        );

        Ok(HttpClient {
            transport,
            query_policy: self.config.query_policy,
            request_timeout: self.config.request_timeout,
            max_body_size: self.config.max_body_size,
            connect_timeout: self.config.connect_timeout,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;

    #[test]
    fn test_builder_default() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config.connect_timeout, Duration::from_secs(1));
        assert_eq!(builder.config.request_timeout, None);
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.config.query_policy, QueryPolicy::AllMethods);
        assert!(builder.transport.is_none());
    }

    #[test]
    fn test_builder_with_config() {
        let builder = HttpClientBuilder::with_config(HttpClientConfig::minimal());
        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_builder_timeouts() {
        let builder = HttpClientBuilder::new()
            .connect_timeout(Duration::from_millis(250))
            .timeout(Duration::from_secs(60));
        assert_eq!(builder.config.connect_timeout, Duration::from_millis(250));
        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(60)));

        let builder = builder.timeout(Duration::ZERO);
        assert_eq!(builder.config.request_timeout, None);
    }

    #[test]
    fn test_builder_setters() {
        let builder = HttpClientBuilder::new()
            .user_agent("custom/1.0")
            .default_header("x-tenant", "acme")
            .max_body_size(1024)
            .query_policy(QueryPolicy::BodylessOnly)
            .tls_roots(TlsRootConfig::Native)
            .pool_idle_timeout(None)
            .pool_max_idle_per_host(0);

        assert_eq!(builder.config.user_agent, "custom/1.0");
        assert_eq!(
            builder.config.default_headers,
            [("x-tenant".to_owned(), "acme".to_owned())]
        );
        assert_eq!(builder.config.max_body_size, 1024);
        assert_eq!(builder.config.query_policy, QueryPolicy::BodylessOnly);
        assert_eq!(builder.config.tls_roots, TlsRootConfig::Native);
        assert_eq!(builder.config.pool_idle_timeout, None);
        assert_eq!(builder.config.pool_max_idle_per_host, 0);
    }

    #[tokio::test]
    async fn test_builder_build() {
        let client = HttpClientBuilder::new()
            .max_body_size(2048)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(client.max_body_size(), 2048);
        assert_eq!(client.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(client.connect_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_builder_build_invalid_user_agent() {
        let client = HttpClientBuilder::new()
            .user_agent("invalid\x00agent")
            .build();
        assert!(matches!(client, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[tokio::test]
    async fn test_builder_native_roots() {
        let result = HttpClientBuilder::new()
            .tls_roots(TlsRootConfig::Native)
            .build();

        // Minimal containers may have no OS certificates.
        match &result {
            Ok(_) => {}
            Err(HttpError::Tls(err)) => {
                let msg = err.to_string();
                assert!(
                    msg.contains("native root") || msg.contains("certificate"),
                    "TLS error should mention certificates: {msg}"
                );
            }
            Err(other) => panic!("Unexpected error type: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_injected_transport_skips_tls_setup() {
        use crate::body::RequestBody;
        use crate::decompression::RawBody;
        use crate::error::BoxError;
        use crate::transport::{TlsVerification, TransportFuture};

        struct Unreachable;

        async fn refuse() -> Result<http::Response<RawBody>, BoxError> {
            Err("connection refused".into())
        }

        impl Transport for Unreachable {
            fn send(
                &self,
                _request: http::Request<RequestBody>,
                _tls: TlsVerification,
            ) -> TransportFuture {
                Box::pin(refuse())
            }
        }

        // An invalid user agent would fail HyperTransport construction.
        let client = HttpClientBuilder::new()
            .user_agent("invalid\x00agent")
            .transport(Arc::new(Unreachable) as Arc<dyn Transport>)
            .build()
            .unwrap();

        let err = client
            .execute(crate::Request::get("http://example.test/"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Dispatch { timeout: None, .. }));
    }
}
