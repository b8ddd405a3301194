//! Small axum servers shared by the integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

/// Serve `router` on an ephemeral local port.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Routes:
/// - `/echo`: decodes the request body per `Content-Encoding` and returns it,
///   gzip-encoded when the request carries `x-respond-gzip`
/// - `/headers/{name}`: every value of header `name`, joined with `|`
/// - `/hang`: answers after ten seconds
/// - `/to-echo`: 307 to `/echo`
/// - `/stalled-gzip`: gzip response headers, then a body that never arrives
pub fn router() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/headers/{name}", any(header_values))
        .route("/hang", get(hang))
        .route("/to-echo", any(redirect_to_echo))
        .route("/stalled-gzip", get(stalled_gzip))
}

async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mut decoded = Vec::new();
    let read = match encoding {
        "gzip" => GzDecoder::new(body.as_ref()).read_to_end(&mut decoded),
        "deflate" => DeflateDecoder::new(body.as_ref()).read_to_end(&mut decoded),
        _ => {
            decoded.extend_from_slice(&body);
            Ok(decoded.len())
        }
    };
    if read.is_err() {
        return (StatusCode::BAD_REQUEST, "undecodable body").into_response();
    }

    if headers.contains_key("x-respond-gzip") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&decoded).unwrap();
        let compressed = encoder.finish().unwrap();
        return (
            [(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"))],
            compressed,
        )
            .into_response();
    }
    decoded.into_response()
}

async fn header_values(
    axum::extract::Path(name): axum::extract::Path<String>,
    headers: HeaderMap,
) -> String {
    headers
        .get_all(name.as_str())
        .iter()
        .map(|v| v.to_str().unwrap_or("<binary>"))
        .collect::<Vec<_>>()
        .join("|")
}

async fn hang() -> &'static str {
    tokio::time::sleep(Duration::from_secs(10)).await;
    "too late"
}

async fn redirect_to_echo() -> impl IntoResponse {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, HeaderValue::from_static("/echo"))],
    )
}

async fn stalled_gzip() -> Response {
    let never = futures_util::stream::pending::<Result<Bytes, std::io::Error>>();
    (
        [(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"))],
        axum::body::Body::from_stream(never),
    )
        .into_response()
}
