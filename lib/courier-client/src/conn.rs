use std::time::Duration;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A builder for the HTTP- and HTTPS-capable connector underlying the client.
#[derive(Clone, Default)]
pub(crate) struct ConnectorBuilder {
    connect_timeout: Option<Duration>,
}

impl ConnectorBuilder {
    /// Sets the timeout when connecting to the remote host.
    ///
    /// Defaults to 30 seconds.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the connector from the given TLS configuration.
    pub fn build(self, tls_config: ClientConfig) -> HttpsConnector<HttpConnector> {
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        // The inner connector must not insist on plain HTTP, or the HTTPS wrapper around it
        // could never see an https URI.
        let mut http_connector = HttpConnector::new();
        http_connector.set_connect_timeout(Some(connect_timeout));
        http_connector.enforce_http(false);

        HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http_connector)
    }
}
