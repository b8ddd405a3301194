//! Tower layers composed into the transport's service stack.
//!
//! - [`DefaultHeadersLayer`] fills in `User-Agent` and client-wide default
//!   headers that a request does not set itself

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
