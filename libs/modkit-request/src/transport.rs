//! The transport capability consumed by the executor.

use crate::body::RequestBody;
use crate::config::{HttpClientConfig, TlsRootConfig};
use crate::decompression::RawBody;
use crate::error::{BoxError, HttpError};
use crate::layers::{DefaultHeadersLayer, DefaultHeadersService};
use crate::tls;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tower::{ServiceBuilder, ServiceExt};

/// Future resolving to the response head of one exchange.
pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<Response<RawBody>, BoxError>> + Send + 'static>>;

/// Certificate verification policy for a single exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsVerification {
    #[default]
    Enabled,
    Disabled,
}

/// Performs one HTTP exchange.
///
/// Implementations own connections, TLS, DNS, and the connect timeout.
/// Redirects are not followed here. Dropping the returned future cancels
/// the exchange.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: Request<RequestBody>, tls: TlsVerification) -> TransportFuture;
}

type PooledService = DefaultHeadersService<Client<HttpsConnector<HttpConnector>, RequestBody>>;

/// hyper-based [`Transport`] with connection pooling.
///
/// Holds two pools built from the same connector settings, one verifying
/// server certificates and one not. Connections made without verification
/// are never handed to a verifying exchange.
#[derive(Clone)]
pub struct HyperTransport {
    verified: PooledService,
    unverified: PooledService,
    connect_timeout: Duration,
}

impl HyperTransport {
    /// Build both pools from `config`.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if a TLS configuration cannot be built, or a
    /// header error if the configured default headers are invalid.
    pub fn new(config: &HttpClientConfig) -> Result<Self, HttpError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(config.connect_timeout));

        let headers = DefaultHeadersLayer::try_new(&config.user_agent, &config.default_headers)?;
        let verified = pooled_service(
            config,
            &headers,
            build_https_connector(config.tls_roots, http.clone())?,
        );
        let unverified = pooled_service(config, &headers, build_unverified_connector(http)?);

        Ok(Self {
            verified,
            unverified,
            connect_timeout: config.connect_timeout,
        })
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: Request<RequestBody>, tls: TlsVerification) -> TransportFuture {
        let service = match tls {
            TlsVerification::Enabled => self.verified.clone(),
            TlsVerification::Disabled => {
                tracing::warn!(
                    uri = %request.uri(),
                    "TLS certificate verification disabled for this request"
                );
                self.unverified.clone()
            }
        };

        let pending: Pin<
            Box<
                dyn Future<
                        Output = Result<
                            Response<hyper::body::Incoming>,
                            hyper_util::client::legacy::Error,
                        >,
                    > + Send,
            >,
        > = Box::pin(service.oneshot(request));
        Box::pin(async move {
            let response = pending.await?;
            Ok(response.map(|body| body.map_err(BoxError::from).boxed()))
        })
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

fn pooled_service(
    config: &HttpClientConfig,
    headers: &DefaultHeadersLayer,
    connector: HttpsConnector<HttpConnector>,
) -> PooledService {
    let mut builder = Client::builder(TokioExecutor::new());

    // pool_timer is required for pool_idle_timeout to take effect
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle_timeout) = config.pool_idle_timeout {
        builder.pool_idle_timeout(idle_timeout);
    }

    ServiceBuilder::new()
        .layer(headers.clone())
        .service(builder.build::<_, RequestBody>(connector))
}

/// HTTPS-or-HTTP connector trusting the configured root store.
///
/// ALPN advertises both h2 and http/1.1; the protocol is picked during the
/// handshake.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    http: HttpConnector,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let connector = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http),
        TlsRootConfig::Native => hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls::native_roots_client_config()?)
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http),
    };
    Ok(connector)
}

fn build_unverified_connector(
    http: HttpConnector,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls::unverified_client_config()?)
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(http))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hyper_transport_builds_with_defaults() {
        let transport = HyperTransport::new(&HttpClientConfig::default()).unwrap();
        assert_eq!(transport.connect_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_native_roots_build_or_report_tls_error() {
        let config = HttpClientConfig {
            tls_roots: TlsRootConfig::Native,
            ..Default::default()
        };
        match HyperTransport::new(&config) {
            Ok(_) => {}
            Err(HttpError::Tls(err)) => {
                let msg = err.to_string();
                assert!(msg.contains("native root"), "unexpected TLS error: {msg}");
            }
            Err(other) => panic!("unexpected error type: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_default_header_fails_construction() {
        let config = HttpClientConfig {
            default_headers: vec![("x-bad".to_owned(), "line\nbreak".to_owned())],
            ..Default::default()
        };
        let err = HyperTransport::new(&config).unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderValue(_)));
    }

    #[test]
    fn test_tls_verification_default_is_enabled() {
        assert_eq!(TlsVerification::default(), TlsVerification::Enabled);
    }
}
