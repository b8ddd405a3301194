//! Per-call state machine: normalize, encode, compress, dispatch, follow
//! redirects, and wrap the final response.

use crate::body::{NormalizedBody, RequestBody, empty_body, full_body};
use crate::client::HttpClient;
use crate::compression::{Compression, compress, compress_stream};
use crate::error::{HttpError, InvalidUriKind, TimeoutPhase};
use crate::query::append_query;
use crate::request::Request;
use crate::response::HttpResponse;
use crate::transport::TlsVerification;
use http::header::{
    ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, HOST, LOCATION, USER_AGENT,
};
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use tracing::debug;

const ACCEPTED_ENCODINGS: &str = "gzip, deflate";

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
    )
}

/// Run one logical request through `client`.
///
/// # Errors
/// Returns the first failure; no exchange is retried.
pub async fn execute(client: &HttpClient, request: Request) -> Result<HttpResponse, HttpError> {
    let Request {
        method,
        uri,
        mut body,
        query,
        headers,
        content_type,
        accept,
        host,
        user_agent,
        insecure,
        max_redirects,
        compression,
        timeout,
        error,
    } = request;

    if let Some(err) = error {
        return Err(err);
    }

    let tls = if insecure {
        TlsVerification::Disabled
    } else {
        TlsVerification::Enabled
    };
    let deadline = timeout
        .filter(|t| !t.is_zero())
        .or(client.request_timeout);
    let replayable = body.is_replayable();
    let implied_content_type = body.default_content_type();

    let mut query = query.filter(|_| client.query_policy.applies_to(&method));
    let mut url = uri;
    let mut remaining = max_redirects;

    loop {
        let payload = body.normalize()?;
        if let Some(query) = query.take() {
            url = append_query(&url, &query.encode()?);
        }
        let target = validate_url(&url)?;
        let (payload, encoding) = encode_payload(payload, compression)?;

        let mut outgoing = http::Request::builder()
            .method(method.clone())
            .uri(target)
            .body(payload)?;
        let out = outgoing.headers_mut();
        for (name, value) in &headers {
            out.append(name.clone(), value.clone());
        }
        set_if_some(out, USER_AGENT, user_agent.as_ref());
        match &content_type {
            Some(value) => {
                out.insert(CONTENT_TYPE, value.clone());
            }
            None => {
                if let Some(implied) = implied_content_type
                    && !out.contains_key(CONTENT_TYPE)
                {
                    out.insert(CONTENT_TYPE, HeaderValue::from_static(implied));
                }
            }
        }
        set_if_some(out, ACCEPT, accept.as_ref());
        if let Some(encoding) = encoding {
            out.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }
        out.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPTED_ENCODINGS));
        set_if_some(out, HOST, host.as_ref());

        debug!(
            method = %method,
            url = %url,
            redirects_left = remaining,
            ?tls,
            "dispatching request"
        );

        let hop = exchange(client, outgoing, tls, &url, remaining > 0, replayable);
        let hop = match deadline {
            Some(limit) => tokio::time::timeout(limit, hop).await.map_err(|elapsed| {
                HttpError::Dispatch {
                    timeout: Some(TimeoutPhase::Request),
                    source: Box::new(elapsed),
                }
            })?,
            None => hop.await,
        }?;

        match hop {
            Hop::Redirect(next) => {
                remaining -= 1;
                url = next;
            }
            Hop::Done(response) => return Ok(response),
        }
    }
}

enum Hop {
    Redirect(String),
    Done(HttpResponse),
}

/// One exchange, up to a response whose body is ready to read.
///
/// Runs entirely under the request deadline, including the read of a gzip
/// stream header.
async fn exchange(
    client: &HttpClient,
    outgoing: http::Request<RequestBody>,
    tls: TlsVerification,
    url: &str,
    may_redirect: bool,
    replayable: bool,
) -> Result<Hop, HttpError> {
    let response = client
        .transport
        .send(outgoing, tls)
        .await
        .map_err(HttpError::dispatch)?;

    let status = response.status();
    if is_redirect(status) && may_redirect {
        if !replayable {
            debug!(%status, url = %url, "not following redirect: request body was a one-shot stream");
        } else if let Some(next) = redirect_target(url, response.headers())? {
            debug!(%status, from = %url, to = %next, "following redirect");
            return Ok(Hop::Redirect(next));
        } else {
            debug!(%status, url = %url, "redirect response without Location");
        }
    }

    HttpResponse::from_raw(response, url.to_owned(), client.max_body_size)
        .await
        .map(Hop::Done)
}

fn set_if_some(headers: &mut HeaderMap, name: http::HeaderName, value: Option<&HeaderValue>) {
    if let Some(value) = value {
        headers.insert(name, value.clone());
    }
}

/// Compress a present payload; an absent one is sent as an empty body with
/// no `Content-Encoding`.
fn encode_payload(
    payload: NormalizedBody,
    compression: Compression,
) -> Result<(RequestBody, Option<&'static str>), HttpError> {
    let Some(encoding) = compression.content_encoding() else {
        return Ok((payload.into_request_body(), None));
    };
    Ok(match payload {
        NormalizedBody::Absent => (empty_body(), None),
        NormalizedBody::Buffered(bytes) => {
            (full_body(compress(bytes, compression)?), Some(encoding))
        }
        NormalizedBody::Streaming(stream) => {
            (compress_stream(stream, compression), Some(encoding))
        }
    })
}

fn validate_url(url: &str) -> Result<Uri, HttpError> {
    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            });
        }
        None => {
            return Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.authority().is_none_or(|a| a.host().is_empty()) {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }
    Ok(uri)
}

/// Absolute URL the `Location` header points to, resolved against `current`.
fn redirect_target(current: &str, headers: &HeaderMap) -> Result<Option<String>, HttpError> {
    let Some(location) = headers.get(LOCATION) else {
        return Ok(None);
    };
    let invalid = |reason: String| HttpError::InvalidUri {
        url: String::from_utf8_lossy(location.as_bytes()).into_owned(),
        kind: InvalidUriKind::InvalidLocation,
        reason,
    };

    let location = location
        .to_str()
        .map_err(|_| invalid("Location header is not visible ASCII".to_owned()))?;
    let base = url::Url::parse(current).map_err(|e| invalid(e.to_string()))?;
    let next = base.join(location).map_err(|e| invalid(e.to_string()))?;
    Ok(Some(next.into()))
}
