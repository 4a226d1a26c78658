use std::sync::Arc;

use rustls::{
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        WebPkiServerVerifier,
    },
    crypto::CryptoProvider,
    pki_types::{CertificateDer, ServerName, UnixTime},
    CertificateError, DigitallySignedStruct, Error, RootCertStore, SignatureScheme,
};

use crate::error::{TlsError, TrustStoreIntegrity};

/// Server certificate verifier that accepts any certificate presented by the peer.
///
/// No identity, expiry, or chain checks are performed. Connections made with this verifier are
/// encrypted but unauthenticated, so it must only ever be reachable through an explicit opt-in.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    /// Creates a verifier that accepts any certificate, using the given provider's signature
    /// schemes during the handshake.
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self, _end_entity: &CertificateDer<'_>, _intermediates: &[CertificateDer<'_>], _server_name: &ServerName<'_>,
        _ocsp_response: &[u8], _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self, _message: &[u8], _cert: &CertificateDer<'_>, _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self, _message: &[u8], _cert: &CertificateDer<'_>, _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Server certificate verifier backed by an explicit set of trust anchors.
///
/// Certificates are validated against the configured anchors via the standard Web PKI rules. An
/// empty anchor set is valid and means "trust nothing": every presented certificate is rejected,
/// which is distinct from falling back to the platform's roots.
#[derive(Debug)]
pub struct TrustStoreVerifier {
    inner: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
}

impl TrustStoreVerifier {
    /// Creates a verifier anchored to the given roots.
    ///
    /// # Errors
    ///
    /// If the anchors cannot be compiled into a usable verifier, an error is returned.
    pub fn new(roots: RootCertStore, provider: Arc<CryptoProvider>) -> Result<Self, TlsError> {
        let inner = if roots.is_empty() {
            None
        } else {
            let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()
                .map_err(|e| TrustStoreIntegrity { detail: e.to_string() }.build())?;
            Some(verifier)
        };

        Ok(Self { inner, provider })
    }
}

impl ServerCertVerifier for TrustStoreVerifier {
    fn verify_server_cert(
        &self, end_entity: &CertificateDer<'_>, intermediates: &[CertificateDer<'_>], server_name: &ServerName<'_>,
        ocsp_response: &[u8], now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        match &self.inner {
            Some(verifier) => verifier.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now),
            None => Err(Error::InvalidCertificate(CertificateError::UnknownIssuer)),
        }
    }

    fn verify_tls12_signature(
        &self, message: &[u8], cert: &CertificateDer<'_>, dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        match &self.inner {
            Some(verifier) => verifier.verify_tls12_signature(message, cert, dss),
            None => Err(Error::InvalidCertificate(CertificateError::UnknownIssuer)),
        }
    }

    fn verify_tls13_signature(
        &self, message: &[u8], cert: &CertificateDer<'_>, dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        match &self.inner {
            Some(verifier) => verifier.verify_tls13_signature(message, cert, dss),
            None => Err(Error::InvalidCertificate(CertificateError::UnknownIssuer)),
        }
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        match &self.inner {
            Some(verifier) => verifier.supported_verify_schemes(),
            None => self.provider.signature_verification_algorithms.supported_schemes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    use super::*;

    fn test_provider() -> Arc<CryptoProvider> {
        Arc::new(rustls::crypto::aws_lc_rs::default_provider())
    }

    fn ca_and_leaf(hostname: &str) -> (CertificateDer<'static>, CertificateDer<'static>) {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf_params = CertificateParams::new(vec![hostname.to_string()]).unwrap();
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        (ca_cert.der().clone(), leaf_cert.der().clone())
    }

    #[test]
    fn accept_any_accepts_unparseable_certificates() {
        let verifier = AcceptAnyServerCert::new(test_provider());
        let garbage = CertificateDer::from(vec![0xde, 0xad, 0xbe, 0xef]);
        let name = ServerName::try_from("example.com").unwrap();

        let result = verifier.verify_server_cert(&garbage, &[], &name, &[], UnixTime::now());
        assert!(result.is_ok());
    }

    #[test]
    fn empty_store_rejects_everything() {
        let verifier = TrustStoreVerifier::new(RootCertStore::empty(), test_provider()).unwrap();
        let (_, leaf) = ca_and_leaf("localhost");
        let name = ServerName::try_from("localhost").unwrap();

        let result = verifier.verify_server_cert(&leaf, &[], &name, &[], UnixTime::now());
        assert!(matches!(
            result,
            Err(Error::InvalidCertificate(CertificateError::UnknownIssuer))
        ));
    }

    #[test]
    fn store_backed_verifier_validates_chain() {
        let (ca, leaf) = ca_and_leaf("localhost");

        let mut roots = RootCertStore::empty();
        roots.add(ca).unwrap();

        let verifier = TrustStoreVerifier::new(roots, test_provider()).unwrap();
        let name = ServerName::try_from("localhost").unwrap();

        verifier
            .verify_server_cert(&leaf, &[], &name, &[], UnixTime::now())
            .expect("leaf signed by trusted CA should verify");
    }

    #[test]
    fn store_backed_verifier_rejects_expired_leaf() {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        leaf_params.not_before = rcgen::date_time_ymd(2001, 1, 1);
        leaf_params.not_after = rcgen::date_time_ymd(2002, 1, 1);
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(ca_cert.der().clone()).unwrap();

        let verifier = TrustStoreVerifier::new(roots, test_provider()).unwrap();
        let name = ServerName::try_from("localhost").unwrap();

        let result = verifier.verify_server_cert(leaf_cert.der(), &[], &name, &[], UnixTime::now());
        assert!(matches!(result, Err(Error::InvalidCertificate(_))));
    }

    #[test]
    fn store_backed_verifier_rejects_unrelated_chain() {
        let (ca, _) = ca_and_leaf("localhost");
        let (_, other_leaf) = ca_and_leaf("localhost");

        let mut roots = RootCertStore::empty();
        roots.add(ca).unwrap();

        let verifier = TrustStoreVerifier::new(roots, test_provider()).unwrap();
        let name = ServerName::try_from("localhost").unwrap();

        let result = verifier.verify_server_cert(&other_leaf, &[], &name, &[], UnixTime::now());
        assert!(result.is_err());
    }
}
