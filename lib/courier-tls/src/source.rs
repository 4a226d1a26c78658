use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

/// A reference to certificate material on disk.
///
/// A source is a plain value: two sources compare equal when they name the same path and carry the
/// same password, regardless of when or where they were constructed. All trust-related caching in
/// this crate keys off that value equality.
///
/// The password is only meaningful for encrypted containers (PKCS#12); it is ignored when the file
/// turns out to be a PEM bundle or a bare DER certificate.
#[derive(Clone, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CertificateSource {
    path: PathBuf,
    #[serde(default)]
    password: Option<String>,
}

impl CertificateSource {
    /// Creates a source for an unencrypted certificate file.
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            path: path.into(),
            password: None,
        }
    }

    /// Creates a source for a password-protected certificate container.
    pub fn with_password<P, S>(path: P, password: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            password: Some(password.into()),
        }
    }

    /// Path of the certificate file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Password for the container, if one was supplied.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateSource")
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A canonical, immutable set of certificate sources.
///
/// Construction canonicalizes the input: sources are sorted and exact duplicates dropped, so two
/// sets built from the same sources in different orders are equal and hash identically. An empty
/// set is valid and means "trust nothing".
///
/// Cloning is cheap; the sources are held behind a shared allocation.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CertificateSet {
    sources: Arc<[CertificateSource]>,
}

impl CertificateSet {
    /// Creates a set from the given sources, canonicalizing as described above.
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = CertificateSource>,
    {
        let mut sources = sources.into_iter().collect::<Vec<_>>();
        sources.sort();
        sources.dedup();

        Self {
            sources: Arc::from(sources),
        }
    }

    /// Returns `true` if the set contains no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of distinct sources in the set.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// The sources, in canonical order.
    pub fn sources(&self) -> &[CertificateSource] {
        &self.sources
    }
}

impl From<CertificateSource> for CertificateSet {
    fn from(source: CertificateSource) -> Self {
        Self::new([source])
    }
}

impl From<Vec<CertificateSource>> for CertificateSet {
    fn from(sources: Vec<CertificateSource>) -> Self {
        Self::new(sources)
    }
}

impl FromIterator<CertificateSource> for CertificateSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = CertificateSource>,
    {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::RandomState,
        hash::{BuildHasher, Hash, Hasher},
    };

    use super::*;

    fn hash_of<H: Hash>(state: &RandomState, value: &H) -> u64 {
        let mut hasher = state.build_hasher();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn source_equality_covers_password() {
        let plain = CertificateSource::new("/etc/courier/ca.pem");
        let same = CertificateSource::new("/etc/courier/ca.pem");
        let encrypted = CertificateSource::with_password("/etc/courier/ca.pem", "hunter2");

        assert_eq!(plain, same);
        assert_ne!(plain, encrypted);
    }

    #[test]
    fn source_debug_redacts_password() {
        let source = CertificateSource::with_password("/etc/courier/intake.p12", "hunter2");
        let rendered = format!("{:?}", source);

        assert!(rendered.contains("intake.p12"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn set_is_order_insensitive() {
        let a = CertificateSource::new("/certs/a.pem");
        let b = CertificateSource::with_password("/certs/b.p12", "secret");

        let forward = CertificateSet::new([a.clone(), b.clone()]);
        let reverse = CertificateSet::new([b, a]);

        assert_eq!(forward, reverse);

        let state = RandomState::new();
        assert_eq!(hash_of(&state, &forward), hash_of(&state, &reverse));
    }

    #[test]
    fn set_deduplicates_exact_repeats() {
        let a = CertificateSource::new("/certs/a.pem");
        let set = CertificateSet::new([a.clone(), a.clone(), a]);

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn same_path_different_password_stays_distinct() {
        let set = CertificateSet::new([
            CertificateSource::with_password("/certs/a.p12", "one"),
            CertificateSource::with_password("/certs/a.p12", "two"),
        ]);

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_set_is_representable() {
        let set = CertificateSet::new([]);

        assert!(set.is_empty());
        assert_eq!(set, CertificateSet::new(Vec::new()));
    }

    #[test]
    fn source_deserializes_from_config_shape() {
        let source: CertificateSource =
            serde_json::from_str(r#"{"path": "/certs/a.p12", "password": "hunter2"}"#).unwrap();
        assert_eq!(source.path(), Path::new("/certs/a.p12"));
        assert_eq!(source.password(), Some("hunter2"));

        let bare: CertificateSource = serde_json::from_str(r#"{"path": "/certs/a.pem"}"#).unwrap();
        assert_eq!(bare.password(), None);
    }
}
