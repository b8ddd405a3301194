#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative HTTP requests for `ModKit`
//!
//! A request is described once with the fluent [`Request`] builder and then
//! executed, either through an [`HttpClient`] or through the process default
//! client with [`Request::send`]. Each call:
//! - serializes the body (text, bytes, JSON, multipart, or a one-shot stream)
//! - appends query parameters, from a multimap or a serializable record
//! - optionally compresses the payload (gzip or raw deflate)
//! - enforces a connect timeout and an optional total-request deadline
//! - follows up to `max_redirects` redirects (301, 302, 303, 307)
//! - decodes gzip/deflate responses as the body is read
//!
//! Transport concerns (pooling, TLS via rustls, DNS) are delegated to
//! hyper-util behind the [`Transport`] trait.
//!
//! # Timeouts
//!
//! The connect timeout comes from the client configuration (1 second by
//! default, see [`set_connect_timeout`]). The total-request deadline comes
//! from [`Request::timeout`] or, failing that, the client's `request_timeout`.
//! [`HttpError::is_timeout`] is true for either; [`HttpError::timeout_phase`]
//! tells them apart.
//!
//! # Example
//!
//! ```ignore
//! use modkit_request::{Compression, QueryValues, Request};
//! use std::time::Duration;
//!
//! let mut query = QueryValues::new();
//! query.add("limit", "3").add("skip", "5");
//!
//! let response = Request::post("https://api.example.com/items")
//!     .query(query)
//!     .json(new_item)
//!     .compression(Compression::Gzip)
//!     .timeout(Duration::from_secs(5))
//!     .max_redirects(3)
//!     .send()
//!     .await?;
//!
//! if response.status().is_success() {
//!     let created: Item = response.json().await?;
//! }
//! ```

mod body;
mod builder;
mod client;
mod compression;
mod config;
mod decompression;
mod error;
mod executor;
mod json;
mod layers;
mod multipart;
mod query;
mod request;
mod response;
mod tls;
mod transport;

pub use body::{Body, JSON_CONTENT_TYPE, NormalizedBody, RequestBody};
pub use builder::HttpClientBuilder;
pub use client::{
    HttpClient, default_client, default_config, set_connect_timeout, set_default_config,
};
pub use compression::{Compression, compress, compress_stream};
pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, HttpClientConfig,
    QueryPolicy, TlsRootConfig,
};
pub use decompression::{ContentCoding, RawBody, ResponseBody};
pub use error::{BoxError, HttpError, InvalidUriKind, TimeoutPhase};
pub use json::JsonSource;
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use multipart::MultipartForm;
pub use query::{Query, QueryValues, append_query};
pub use request::Request;
pub use response::{HttpResponse, LimitedBody};
pub use transport::{HyperTransport, TlsVerification, Transport, TransportFuture};
