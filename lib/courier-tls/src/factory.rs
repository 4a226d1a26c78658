use std::sync::Arc;

use rustls::{
    client::{danger::ServerCertVerifier, Resumption},
    crypto::CryptoProvider,
    ClientConfig,
};

use crate::error::TlsError;
use crate::source::CertificateSet;
use crate::store;
use crate::verify::{AcceptAnyServerCert, TrustStoreVerifier};

const DEFAULT_MAX_TLS12_RESUMPTION_SESSIONS: usize = 8;

/// How a factory decides whether to trust the certificate a server presents.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TrustPolicy {
    /// Accept any certificate, without validation.
    AcceptAny,

    /// Accept only certificates that chain to one of the given sources.
    ///
    /// An empty set is permitted and accepts nothing.
    TrustedSources(CertificateSet),

    /// Accept certificates that chain to the platform's native root certificates.
    PlatformRoots,
}

/// An immutable TLS client configuration factory.
///
/// A factory pairs a trust policy with the `rustls` client configuration built from it. Factories
/// are only handed out behind `Arc` by [`TlsFactoryCache`][crate::TlsFactoryCache], and their
/// *reference* identity is meaningful: every configuration cloned out of one factory shares the
/// same verifier and the same in-memory session resumption store, so connections built from the
/// same factory instance can resume each other's TLS sessions and be pooled together by transport
/// layers that key reuse on configuration identity.
///
/// Two factories built from equal inputs at different times are interchangeable in what they
/// trust, but not in that sharing sense; [`TlsFactory::same_instance`] is the test that matters.
#[derive(Debug)]
pub struct TlsFactory {
    policy: TrustPolicy,
    config: ClientConfig,
}

impl TlsFactory {
    pub(crate) fn build(policy: TrustPolicy) -> Result<Self, TlsError> {
        let provider = default_crypto_provider();

        let verifier: Arc<dyn ServerCertVerifier> = match &policy {
            TrustPolicy::AcceptAny => Arc::new(AcceptAnyServerCert::new(Arc::clone(&provider))),
            TrustPolicy::TrustedSources(sources) => {
                let roots = store::load_trust_store(sources)?;
                Arc::new(TrustStoreVerifier::new(roots, Arc::clone(&provider))?)
            }
            TrustPolicy::PlatformRoots => {
                let roots = store::load_native_roots()?;
                Arc::new(TrustStoreVerifier::new(roots, Arc::clone(&provider))?)
            }
        };

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|source| TlsError::ConfigurationUnavailable { source })?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        config.resumption = Resumption::in_memory_sessions(DEFAULT_MAX_TLS12_RESUMPTION_SESSIONS);

        #[cfg(feature = "fips")]
        if !config.fips() {
            return Err(TlsError::ConfigurationUnavailable {
                source: rustls::Error::General("client TLS configuration is not FIPS compliant".to_string()),
            });
        }

        Ok(Self { policy, config })
    }

    /// The trust policy this factory was built from.
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Returns a client configuration backed by this factory.
    ///
    /// The returned configuration shares its internals with every other configuration returned by
    /// this factory instance, including the session resumption store.
    pub fn client_config(&self) -> ClientConfig {
        self.config.clone()
    }

    /// Returns `true` if `a` and `b` are the same factory instance.
    ///
    /// This is the interchangeability test for connection reuse: equal trust policies are not
    /// enough, the factories must be reference-identical.
    pub fn same_instance(a: &Arc<TlsFactory>, b: &Arc<TlsFactory>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

/// Resolves the cryptography provider to build configurations with.
///
/// If the process has installed a default provider, it is respected; otherwise AWS-LC is used
/// without installing it process-wide.
fn default_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    use super::*;
    use crate::source::CertificateSource;

    fn ca_pem() -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn builds_accept_any_factory() {
        let factory = TlsFactory::build(TrustPolicy::AcceptAny).unwrap();
        assert_eq!(factory.policy(), &TrustPolicy::AcceptAny);
    }

    #[test]
    fn builds_factory_from_pem_source() {
        let dir = tempfile::tempdir().unwrap();
        let ca_path = dir.path().join("ca.pem");
        fs::write(&ca_path, ca_pem()).unwrap();

        let sources = CertificateSet::from(CertificateSource::new(&ca_path));
        let factory = TlsFactory::build(TrustPolicy::TrustedSources(sources.clone())).unwrap();

        assert_eq!(factory.policy(), &TrustPolicy::TrustedSources(sources));
    }

    #[test]
    fn builds_trust_nothing_factory_from_empty_set() {
        let factory = TlsFactory::build(TrustPolicy::TrustedSources(CertificateSet::new([]))).unwrap();
        assert!(matches!(factory.policy(), TrustPolicy::TrustedSources(s) if s.is_empty()));
    }

    #[test]
    fn source_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pem");

        let sources = CertificateSet::from(CertificateSource::new(&missing));
        let err = TlsFactory::build(TrustPolicy::TrustedSources(sources)).unwrap_err();

        assert!(err.is_certificate_source());
    }

    #[test]
    fn factory_debug_names_its_policy() {
        let factory = TlsFactory::build(TrustPolicy::AcceptAny).unwrap();
        assert!(format!("{:?}", factory).contains("AcceptAny"));
    }

    #[test]
    fn same_instance_is_reference_identity() {
        let a = Arc::new(TlsFactory::build(TrustPolicy::AcceptAny).unwrap());
        let b = Arc::new(TlsFactory::build(TrustPolicy::AcceptAny).unwrap());

        assert!(TlsFactory::same_instance(&a, &Arc::clone(&a)));

        // Equal inputs at different times build distinct instances; interchangeability for
        // connection reuse requires the identical instance, not an equal one.
        assert!(!TlsFactory::same_instance(&a, &b));
    }
}
