use std::{io, path::PathBuf};

use snafu::Snafu;

/// Errors produced while loading certificate sources or building TLS client configurations.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum TlsError {
    /// A client configuration could not be assembled from otherwise valid inputs.
    #[snafu(display("failed to assemble TLS client configuration: {source}"))]
    ConfigurationUnavailable {
        /// Error source.
        source: rustls::Error,
    },

    /// A certificate source could not be read from disk.
    #[snafu(display("failed to read certificate source '{}': {}", path.display(), source))]
    SourceNotReadable {
        /// Path of the certificate source.
        path: PathBuf,

        /// Error source.
        source: io::Error,
    },

    /// A certificate source was read but could not be decoded as any supported container format.
    #[snafu(display("certificate source '{}' is not a usable PEM, PKCS#12, or DER container: {}", path.display(), detail))]
    SourceMalformed {
        /// Path of the certificate source.
        path: PathBuf,

        /// Decoder-specific failure detail.
        detail: String,
    },

    /// A password-protected certificate source failed its integrity check.
    ///
    /// This is almost always a wrong (or missing) password, but it is also the failure mode for a
    /// container that was truncated or modified after it was written.
    #[snafu(display("integrity check failed for certificate source '{}': wrong password or corrupted container", path.display()))]
    SourceBadPassword {
        /// Path of the certificate source.
        path: PathBuf,
    },

    /// A certificate source description was rejected before any I/O was attempted.
    #[snafu(display("invalid certificate source: {reason}"))]
    InvalidSource {
        /// Why the source was rejected.
        reason: String,
    },

    /// Certificates were loaded but could not be turned into usable trust anchors.
    #[snafu(display("failed to derive trust anchors from loaded certificates: {detail}"))]
    TrustStoreIntegrity {
        /// Verifier-specific failure detail.
        detail: String,
    },

    /// The platform's native certificate store could not be loaded.
    #[snafu(display("failed to load platform root certificates: {detail}"))]
    NativeRoots {
        /// Joined failure detail from the platform store.
        detail: String,
    },
}

impl TlsError {
    /// Returns `true` if this error was caused by caller-supplied certificate material, rather
    /// than by configuration assembly or the platform's own store.
    ///
    /// Source errors are the ones a caller can plausibly fix by correcting a path, a password, or
    /// the certificate material. Failed factory builds are never cached, so a corrected retry goes
    /// through the full build path again.
    pub fn is_certificate_source(&self) -> bool {
        matches!(
            self,
            Self::SourceNotReadable { .. } | Self::SourceMalformed { .. } | Self::SourceBadPassword { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_source_errors() {
        let not_readable = TlsError::SourceNotReadable {
            path: PathBuf::from("/tmp/missing.pem"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(not_readable.is_certificate_source());

        let bad_password = TlsError::SourceBadPassword {
            path: PathBuf::from("/tmp/bundle.p12"),
        };
        assert!(bad_password.is_certificate_source());

        let unavailable = TlsError::ConfigurationUnavailable {
            source: rustls::Error::NoCertificatesPresented,
        };
        assert!(!unavailable.is_certificate_source());

        let integrity = TlsError::TrustStoreIntegrity {
            detail: "no trust anchors".to_string(),
        };
        assert!(!integrity.is_certificate_source());

        let native = TlsError::NativeRoots {
            detail: "no store found".to_string(),
        };
        assert!(!native.is_certificate_source());
    }

    #[test]
    fn display_names_the_offending_path() {
        let err = TlsError::SourceBadPassword {
            path: PathBuf::from("/etc/courier/intake.p12"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("/etc/courier/intake.p12"));
        assert!(rendered.contains("wrong password"));
    }
}
