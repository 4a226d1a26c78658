use std::{fs, path::Path};

use p12::PFX;
use rustls::{pki_types::CertificateDer, RootCertStore};
use snafu::ResultExt as _;
use tracing::debug;

use crate::error::{InvalidSource, NativeRoots, SourceBadPassword, SourceMalformed, SourceNotReadable, TlsError};
use crate::source::{CertificateSet, CertificateSource};

const PEM_MARKER: &[u8] = b"-----BEGIN ";

/// Loads every source in the set into a fresh root certificate store.
///
/// Sources are loaded in canonical set order. Each file is decoded according to its contents: a
/// PEM bundle (any number of certificates), a PKCS#12 container (password-protected), or a single
/// DER-encoded certificate. The first source that fails aborts the load; partial stores are never
/// returned.
pub(crate) fn load_trust_store(sources: &CertificateSet) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();

    for source in sources.sources() {
        let added = load_source(&mut roots, source)?;
        debug!("Loaded {} certificates from '{}'.", added, source.path().display());
    }

    Ok(roots)
}

fn load_source(roots: &mut RootCertStore, source: &CertificateSource) -> Result<usize, TlsError> {
    let path = source.path();
    if path.as_os_str().is_empty() {
        return InvalidSource {
            reason: "certificate source path is empty",
        }
        .fail();
    }

    let contents = fs::read(path).context(SourceNotReadable { path })?;

    if looks_like_pem(&contents) {
        load_pem(roots, path, &contents)
    } else if let Ok(pfx) = PFX::parse(&contents) {
        load_pkcs12(roots, source, pfx)
    } else {
        load_der(roots, path, contents)
    }
}

fn looks_like_pem(contents: &[u8]) -> bool {
    contents.windows(PEM_MARKER.len()).any(|window| window == PEM_MARKER)
}

fn load_pem(roots: &mut RootCertStore, path: &Path, contents: &[u8]) -> Result<usize, TlsError> {
    let mut reader = &contents[..];
    let mut added = 0;

    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| {
            SourceMalformed {
                path,
                detail: format!("invalid PEM section: {}", e),
            }
            .build()
        })?;
        add_certificate(roots, path, cert)?;
        added += 1;
    }

    if added == 0 {
        return SourceMalformed {
            path,
            detail: "no certificates found in PEM file",
        }
        .fail();
    }

    Ok(added)
}

fn load_pkcs12(roots: &mut RootCertStore, source: &CertificateSource, pfx: PFX) -> Result<usize, TlsError> {
    let path = source.path();
    let password = source.password().unwrap_or("");

    if !pfx.verify_mac(password) {
        return SourceBadPassword { path }.fail();
    }

    let cert_bags = pfx.cert_x509_bags(password).map_err(|e| {
        SourceMalformed {
            path,
            detail: format!("unreadable PKCS#12 certificate bags: {}", e),
        }
        .build()
    })?;

    if cert_bags.is_empty() {
        return SourceMalformed {
            path,
            detail: "no certificates found in PKCS#12 container",
        }
        .fail();
    }

    let added = cert_bags.len();
    for der in cert_bags {
        add_certificate(roots, path, CertificateDer::from(der))?;
    }

    Ok(added)
}

fn load_der(roots: &mut RootCertStore, path: &Path, contents: Vec<u8>) -> Result<usize, TlsError> {
    add_certificate(roots, path, CertificateDer::from(contents))?;
    Ok(1)
}

fn add_certificate(roots: &mut RootCertStore, path: &Path, cert: CertificateDer<'static>) -> Result<(), TlsError> {
    roots.add(cert).map_err(|e| {
        SourceMalformed {
            path,
            detail: format!("certificate is not usable as a trust anchor: {}", e),
        }
        .build()
    })
}

/// Loads the platform's native root certificates into a fresh store.
pub(crate) fn load_native_roots() -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();

    let result = rustls_native_certs::load_native_certs();
    if !result.errors.is_empty() {
        let joined_errors = result
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        return NativeRoots { detail: joined_errors }.fail();
    }

    let (added, failed) = roots.add_parsable_certificates(result.certs);
    if added == 0 {
        return NativeRoots {
            detail: "platform certificate store contained no usable certificates",
        }
        .fail();
    }
    if failed > 0 {
        debug!(
            "Added {} platform root certificates, but failed to add {} certificates.",
            added, failed
        );
    } else {
        debug!("Added {} platform root certificates.", added);
    }

    Ok(roots)
}
