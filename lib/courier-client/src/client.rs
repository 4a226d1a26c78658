use std::{sync::Arc, time::Duration};

use courier_tls::{
    platform_factory, trust_all_factory, trusted_sources_factory, CertificateSource, TlsError, TlsFactory,
};
use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Builder, Client},
    rt::{TokioExecutor, TokioTimer},
};
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::conn::ConnectorBuilder;

/// An HTTP client error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ClientError {
    /// TLS configuration could not be resolved for the client's trust settings.
    #[snafu(display("failed to resolve TLS configuration: {source}"))]
    Tls {
        /// Error source.
        source: TlsError,
    },

    /// The request could not be sent, or no response was received.
    #[snafu(display("request failed: {source}"))]
    SendRequest {
        /// Error source.
        source: hyper_util::client::legacy::Error,
    },
}

/// Trust configuration for an HTTP client.
///
/// Settings resolve through the process-wide TLS factory cache, so separately built clients with
/// equal settings end up sharing one factory instance, and with it the connection-reuse behavior
/// that hangs off configuration identity.
///
/// Skipping certificate validation is its own named variant rather than a flag, so it cannot be
/// reached by omission or by a default.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TrustSettings {
    /// Validate server certificates against the platform's native roots.
    #[default]
    PlatformDefault,

    /// Accept any server certificate, without validation.
    ///
    /// Connections are encrypted but unauthenticated.
    AcceptAnyCertificate,

    /// Validate server certificates against exactly the given sources.
    TrustedCertificates(Vec<CertificateSource>),
}

impl TrustSettings {
    fn resolve(&self) -> Result<Arc<TlsFactory>, TlsError> {
        match self {
            Self::PlatformDefault => platform_factory(),
            Self::AcceptAnyCertificate => trust_all_factory(),
            Self::TrustedCertificates(sources) => trusted_sources_factory(sources.clone()),
        }
    }
}

/// An HTTP client.
///
/// Cheap to clone; clones share the same connection pool and TLS factory.
pub struct HttpClient<B = ()> {
    client: Client<HttpsConnector<HttpConnector>, B>,
    factory: Arc<TlsFactory>,
}

impl HttpClient<()> {
    /// Creates a new builder for configuring an HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }
}

impl<B> HttpClient<B> {
    /// The TLS factory backing this client's HTTPS connections.
    ///
    /// Two clients are interchangeable for connection reuse only when their factories are the
    /// same instance; see [`TlsFactory::same_instance`].
    pub fn tls_factory(&self) -> &Arc<TlsFactory> {
        &self.factory
    }
}

impl<B> HttpClient<B>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    /// Sends a request to the server, and waits for a response.
    ///
    /// # Errors
    ///
    /// If there was an error sending the request, an error will be returned.
    pub async fn send(&self, req: Request<B>) -> Result<Response<Incoming>, ClientError> {
        self.client.request(req).await.context(SendRequest)
    }
}

impl<B> Clone for HttpClient<B> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

/// An HTTP client builder.
///
/// Provides an ergonomic builder API for configuring an HTTP client.
///
/// # Defaults
///
/// A number of sensible defaults are provided:
///
/// - support for both HTTP and HTTPS (server certificates validated against the platform's roots)
/// - support for both HTTP/1.1 and HTTP/2 (automatically negotiated via ALPN)
/// - a 30 second connect timeout
/// - connection pool for reusing connections (45 second idle connection timeout, and a maximum of
///   5 idle connections per host)
#[derive(Clone)]
pub struct HttpClientBuilder {
    connector_builder: ConnectorBuilder,
    hyper_builder: Builder,
    trust: TrustSettings,
}

impl HttpClientBuilder {
    /// Sets the timeout when connecting to the remote host.
    ///
    /// Defaults to 30 seconds.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connector_builder = self.connector_builder.with_connect_timeout(timeout);
        self
    }

    /// Sets the maximum number of idle connections per host.
    ///
    /// Defaults to 5.
    pub fn with_max_idle_conns_per_host(mut self, max: usize) -> Self {
        self.hyper_builder.pool_max_idle_per_host(max);
        self
    }

    /// Sets the idle connection timeout.
    ///
    /// Once a connection has been idle in the pool for longer than this duration, it will be
    /// closed and removed from the pool.
    ///
    /// Defaults to 45 seconds.
    pub fn with_idle_conn_timeout(mut self, timeout: Duration) -> Self {
        self.hyper_builder.pool_idle_timeout(timeout);
        self
    }

    /// Sets the trust settings used for server certificate validation.
    ///
    /// Defaults to [`TrustSettings::PlatformDefault`].
    pub fn with_trust_settings(mut self, trust: TrustSettings) -> Self {
        self.trust = trust;
        self
    }

    /// Sets the underlying Hyper client configuration.
    ///
    /// This is provided to allow for more advanced configuration of the Hyper client itself, and
    /// should generally be used sparingly.
    pub fn with_hyper_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Builder),
    {
        f(&mut self.hyper_builder);
        self
    }

    /// Builds the `HttpClient`.
    ///
    /// Resolves the configured trust settings through the process-wide TLS factory cache, so
    /// equal settings across clients share one factory instance.
    ///
    /// # Errors
    ///
    /// If the TLS configuration for the client could not be resolved, an error will be returned.
    pub fn build<B>(self) -> Result<HttpClient<B>, ClientError>
    where
        B: Body + Send + Unpin + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let factory = self.trust.resolve().context(Tls)?;
        debug!("Built HTTP client with trust settings {:?}.", self.trust);

        let connector = self.connector_builder.build(factory.client_config());
        let client = self.hyper_builder.build(connector);

        Ok(HttpClient { client, factory })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        let mut hyper_builder = Builder::new(TokioExecutor::new());
        hyper_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(45));

        Self {
            connector_builder: ConnectorBuilder::default(),
            hyper_builder,
            trust: TrustSettings::default(),
        }
    }
}
