//! TLS client configuration factories with identity-preserving caching.
//!
//! Builds `rustls` client configurations from three kinds of trust input (accept-any, explicit
//! certificate sources, platform roots) and hands them out as shared factories. While a factory
//! for a given input is alive, every equal request returns the identical instance; transport
//! layers that key connection reuse on configuration identity can therefore pool connections
//! across independent callers.
//!
//! Most callers use the process-wide functions ([`trust_all_factory`], [`trusted_sources_factory`],
//! [`platform_factory`]); [`TlsFactoryCache`] is the same machinery as an owned value for callers
//! that need isolation.

mod cache;
mod error;
mod factory;
mod source;
mod store;
mod verify;

pub use self::cache::{platform_factory, trust_all_factory, trusted_sources_factory, TlsFactoryCache};
pub use self::error::TlsError;
pub use self::factory::{TlsFactory, TrustPolicy};
pub use self::source::{CertificateSet, CertificateSource};
pub use self::verify::{AcceptAnyServerCert, TrustStoreVerifier};
