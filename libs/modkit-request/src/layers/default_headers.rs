use crate::error::HttpError;
use http::header::{HeaderName, USER_AGENT};
use http::{HeaderMap, HeaderValue, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer filling in headers a request does not carry yet.
///
/// Used by the transport to apply the configured `User-Agent` and any
/// client-wide default headers. Headers set on the request always win.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl DefaultHeadersLayer {
    /// Build the layer from a user agent and extra `(name, value)` pairs.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` or `HttpError::InvalidHeaderValue`
    /// if any pair is not a valid header.
    pub fn try_new(
        user_agent: &str,
        extra: &[(String, String)],
    ) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::with_capacity(extra.len() + 1);
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        for (name, value) in extra {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(Self {
            headers: Arc::new(headers),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service produced by [`DefaultHeadersLayer`]
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        for name in self.headers.keys() {
            if !headers.contains_key(name) {
                for value in self.headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes the request headers back as the response headers.
    #[derive(Clone)]
    struct EchoHeaders;

    impl Service<Request<Full<Bytes>>> for EchoHeaders {
        type Response = Response<Full<Bytes>>;
        type Error = Box<dyn std::error::Error + Send + Sync>;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::new()))
                .unwrap();
            *response.headers_mut() = req.headers().clone();
            std::future::ready(Ok(response))
        }
    }

    fn request(headers: &[(&str, &str)]) -> Request<Full<Bytes>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("http://example.com");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_user_agent_added() {
        let layer = DefaultHeadersLayer::try_new("test-agent/1.0", &[]).unwrap();
        let response = layer.layer(EchoHeaders).oneshot(request(&[])).await.unwrap();

        assert_eq!(response.headers()[USER_AGENT], "test-agent/1.0");
    }

    #[tokio::test]
    async fn test_user_agent_not_overwritten() {
        let layer = DefaultHeadersLayer::try_new("test-agent/1.0", &[]).unwrap();
        let response = layer
            .layer(EchoHeaders)
            .oneshot(request(&[("user-agent", "custom-agent/2.0")]))
            .await
            .unwrap();

        assert_eq!(response.headers()[USER_AGENT], "custom-agent/2.0");
    }

    #[tokio::test]
    async fn test_extra_defaults_fill_only_missing_names() {
        let extra = vec![
            ("x-tenant".to_owned(), "acme".to_owned()),
            ("x-trace".to_owned(), "a".to_owned()),
            ("x-trace".to_owned(), "b".to_owned()),
        ];
        let layer = DefaultHeadersLayer::try_new("ua", &extra).unwrap();
        let response = layer
            .layer(EchoHeaders)
            .oneshot(request(&[("x-tenant", "other")]))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers["x-tenant"], "other");
        let traces: Vec<&str> = headers
            .get_all("x-trace")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(traces, ["a", "b"]);
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let result = DefaultHeadersLayer::try_new("invalid\x00agent", &[]);
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[test]
    fn test_invalid_default_header_name_rejected() {
        let extra = vec![("bad name".to_owned(), "v".to_owned())];
        let result = DefaultHeadersLayer::try_new("ua", &extra);
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
    }
}
