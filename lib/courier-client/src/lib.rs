//! HTTPS-capable HTTP client built on the shared TLS factory cache.
//!
//! Clients are configured through [`TrustSettings`], which resolve to cached
//! [`TlsFactory`][courier_tls::TlsFactory] instances: clients built with equal trust settings
//! share one factory, and through it one TLS session cache.
#![deny(warnings)]
#![deny(missing_docs)]

mod client;
mod conn;

pub use self::client::{ClientError, HttpClient, HttpClientBuilder, TrustSettings};
