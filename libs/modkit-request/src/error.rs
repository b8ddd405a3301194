use std::error::Error as StdError;
use thiserror::Error;

/// Boxed cause carried by transport-facing error variants.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
    /// Redirect `Location` could not be resolved against the current URL
    InvalidLocation,
}

/// Which deadline expired when a dispatch failed with a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Connection establishment exceeded the connect timeout
    Connect,
    /// The whole exchange exceeded the total-request deadline
    Request,
}

impl TimeoutPhase {
    fn label(self) -> &'static str {
        match self {
            TimeoutPhase::Connect => "Connect timed out",
            TimeoutPhase::Request => "Request timed out",
        }
    }
}

/// HTTP client error types
///
/// Every variant is terminal for the logical request: nothing is retried.
/// Callers are expected to branch on [`HttpError::is_timeout`]; finer transport
/// failure categories are reachable through [`std::error::Error::source`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request body could not be serialized
    #[error("Failed to encode request body: {0}")]
    BodyEncoding(#[source] serde_json::Error),

    /// Form fields could not be URL-encoded
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Query parameters could not be encoded
    #[error("Failed to encode query string: {0}")]
    QueryEncoding(#[source] BoxError),

    /// Request payload compression failed
    #[error("Failed to compress request body: {0}")]
    Compression(#[source] std::io::Error),

    /// Request method is not a valid HTTP token
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// URL scheme is not supported
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },

    /// Transport failed to complete the exchange
    #[error("{}: {source}", .timeout.map_or("Transport error", TimeoutPhase::label))]
    Dispatch {
        /// Set when the failure was caused by an expired deadline
        timeout: Option<TimeoutPhase>,
        /// Underlying transport error
        #[source]
        source: BoxError,
    },

    /// Response body could not be decoded according to its `Content-Encoding`
    #[error("Failed to decompress response body: {0}")]
    Decompression(#[source] std::io::Error),

    /// Reading the response body from the transport failed
    #[error("Failed to read response body: {0}")]
    BodyRead(#[source] BoxError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[source] serde_json::Error),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),
}

impl HttpError {
    /// Returns `true` when the request failed because a deadline expired,
    /// either while connecting or while waiting for the whole exchange.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.timeout_phase().is_some()
    }

    /// Returns which deadline expired, if this is a timed out dispatch.
    #[must_use]
    pub fn timeout_phase(&self) -> Option<TimeoutPhase> {
        match self {
            HttpError::Dispatch { timeout, .. } => *timeout,
            _ => None,
        }
    }

    /// Classify a transport failure.
    ///
    /// Walks the cause chain looking for a timeout indicator: an
    /// `io::ErrorKind::TimedOut` is raised by the connector when the connect
    /// deadline expires, while hyper reports its own timers through
    /// `hyper::Error::is_timeout`.
    pub(crate) fn dispatch(source: BoxError) -> Self {
        let timeout = timeout_in_chain(source.as_ref());
        HttpError::Dispatch { timeout, source }
    }
}

fn timeout_in_chain(err: &(dyn StdError + 'static)) -> Option<TimeoutPhase> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return Some(TimeoutPhase::Connect);
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>()
            && hyper_err.is_timeout()
        {
            return Some(TimeoutPhase::Request);
        }
        if e.is::<tokio::time::error::Elapsed>() {
            return Some(TimeoutPhase::Request);
        }
        current = e.source();
    }
    None
}
