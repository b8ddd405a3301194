use crate::builder::HttpClientBuilder;
use crate::config::{HttpClientConfig, QueryPolicy};
use crate::error::HttpError;
use crate::executor;
use crate::request::Request;
use crate::response::HttpResponse;
use crate::transport::Transport;
use parking_lot::RwLock;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// HTTP client executing [`Request`] descriptors.
///
/// `HttpClient` is `Clone + Send + Sync`; clones share one [`Transport`] and
/// therefore one connection pool. Callers do not need to wrap it in a `Mutex`.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .timeout(Duration::from_secs(5))
///     .build()?;
///
/// let items: Vec<Item> = client
///     .execute(Request::get("https://api.example.com/items").max_redirects(3))
///     .await?
///     .json()
///     .await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) query_policy: QueryPolicy,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) max_body_size: usize,
    pub(crate) connect_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Execute `request`, following redirects up to its budget.
    ///
    /// Any status code is a successful result; only failures to produce a
    /// response are errors.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - a method or header given to the request builder was invalid
    /// - the body or query could not be encoded, or compression failed
    /// - the URL (or a redirect `Location`) is invalid
    /// - the transport failed or a deadline expired (see [`HttpError::is_timeout`])
    /// - the response declared gzip but its body is not gzip
    pub async fn execute(&self, request: Request) -> Result<HttpResponse, HttpError> {
        executor::execute(self, request).await
    }

    #[must_use]
    pub fn query_policy(&self) -> QueryPolicy {
        self.query_policy
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Connect timeout the client was built with. Not applied to an injected
    /// transport.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("query_policy", &self.query_policy)
            .field("request_timeout", &self.request_timeout)
            .field("max_body_size", &self.max_body_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

struct ProcessDefaults {
    config: HttpClientConfig,
    client: Option<HttpClient>,
}

static PROCESS_DEFAULTS: LazyLock<RwLock<ProcessDefaults>> = LazyLock::new(|| {
    RwLock::new(ProcessDefaults {
        config: HttpClientConfig::default(),
        client: None,
    })
});

/// The client used by [`Request::send`].
///
/// Built from the process default configuration on first use and shared
/// afterwards, until [`set_default_config`] or [`set_connect_timeout`]
/// replaces the configuration.
///
/// # Errors
/// Returns an error if the client cannot be built from the configuration.
pub fn default_client() -> Result<HttpClient, HttpError> {
    if let Some(client) = PROCESS_DEFAULTS.read().client.clone() {
        return Ok(client);
    }

    let mut defaults = PROCESS_DEFAULTS.write();
    if let Some(client) = defaults.client.clone() {
        return Ok(client);
    }
    let client = HttpClientBuilder::with_config(defaults.config.clone()).build()?;
    defaults.client = Some(client.clone());
    Ok(client)
}

/// Copy of the process default configuration.
#[must_use]
pub fn default_config() -> HttpClientConfig {
    PROCESS_DEFAULTS.read().config.clone()
}

/// Replace the process default configuration.
///
/// Requests sent afterwards through [`Request::send`] use a client built from
/// `config`; requests already in flight are unaffected.
pub fn set_default_config(config: HttpClientConfig) {
    let mut defaults = PROCESS_DEFAULTS.write();
    defaults.config = config;
    defaults.client = None;
}

/// Change the connect timeout of the process default configuration.
pub fn set_connect_timeout(timeout: Duration) {
    let mut defaults = PROCESS_DEFAULTS.write();
    defaults.config.connect_timeout = timeout;
    defaults.client = None;
    tracing::debug!(?timeout, "default connect timeout changed");
}
