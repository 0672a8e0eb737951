//! HTTP collaborators of the engine
//!
//! The engine only needs something that turns a [`Target`](crate::Target)
//! into a [`Response`](crate::Response). [`HttpTransport`] does this with
//! reqwest; [`DumpingTransport`] wraps any transport and captures every
//! exchange on disk, keyed by the request fingerprint.

mod dump;
mod fingerprint;
mod normalize;
mod transport;

pub use dump::DumpingTransport;
pub use fingerprint::{encode_headers, request_fingerprint};
pub use normalize::canonicalize_url;
pub use transport::{build_http_client, format_user_agent, HttpTransport, Transport};
