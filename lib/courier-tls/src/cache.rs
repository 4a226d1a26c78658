use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, Mutex, OnceLock, PoisonError, Weak},
};

use tracing::{debug, trace};

use crate::error::TlsError;
use crate::factory::{TlsFactory, TrustPolicy};
use crate::source::CertificateSet;

/// Process-wide cache instance backing the free functions.
static SHARED_CACHE: LazyLock<TlsFactoryCache> = LazyLock::new(TlsFactoryCache::new);

/// A deduplicating cache of TLS client configuration factories.
///
/// The cache hands out factories behind `Arc` and guarantees that, while a factory for a given
/// trust input is alive anywhere in the process, every request for an equal input returns that
/// same instance. Identity is the point: transport layers key connection reuse on configuration
/// identity, so two callers that trust the same certificates should end up on the same pooled
/// connections.
///
/// Three trust inputs are supported:
///
/// - the accept-any factory, built at most once per cache and kept for the cache's lifetime;
/// - the platform-trust factory, same lifetime discipline, anchored to the operating system's
///   native roots;
/// - custom certificate sets, deduplicated by canonical value and held through `Weak` references,
///   so the cache never keeps a custom factory alive on its own. Dead entries are swept on access.
///
/// Build failures are never cached. A failed build leaves no entry behind, and a later call with
/// corrected input goes through the full build path again.
///
/// Most callers want the process-wide functions ([`trust_all_factory`], [`trusted_sources_factory`],
/// [`platform_factory`]) so that factory sharing spans the whole process; separately constructed
/// caches share nothing, which is also what makes isolated instances useful in tests.
pub struct TlsFactoryCache {
    trust_all: FactorySlot,
    platform: FactorySlot,
    entries: Mutex<HashMap<CertificateSet, CustomEntry, foldhash::quality::RandomState>>,
}

/// Lazily-initialized singleton slot, double-checked against the companion init lock.
struct FactorySlot {
    init: Mutex<()>,
    slot: OnceLock<Arc<TlsFactory>>,
}

impl FactorySlot {
    fn new() -> Self {
        Self {
            init: Mutex::new(()),
            slot: OnceLock::new(),
        }
    }
}

struct CustomEntry {
    factory: Weak<TlsFactory>,
    build_lock: Arc<Mutex<()>>,
}

impl TlsFactoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            trust_all: FactorySlot::new(),
            platform: FactorySlot::new(),
            entries: Mutex::new(HashMap::default()),
        }
    }

    /// Returns the factory that accepts any server certificate.
    ///
    /// Built on first use and kept for the lifetime of the cache; every subsequent call returns
    /// the identical instance. A failed build is not cached and the next call retries.
    ///
    /// # Errors
    ///
    /// If the TLS stack cannot assemble a client configuration, an error is returned.
    pub fn trust_all(&self) -> Result<Arc<TlsFactory>, TlsError> {
        self.singleton(&self.trust_all, TrustPolicy::AcceptAny, "accept-any")
    }

    /// Returns the factory anchored to the platform's native root certificates.
    ///
    /// Built on first use and kept for the lifetime of the cache, with the same retry-on-failure
    /// behavior as [`trust_all`][Self::trust_all].
    ///
    /// # Errors
    ///
    /// If the platform's certificate store cannot be loaded, or a client configuration cannot be
    /// assembled from it, an error is returned.
    pub fn platform(&self) -> Result<Arc<TlsFactory>, TlsError> {
        self.singleton(&self.platform, TrustPolicy::PlatformRoots, "platform-trust")
    }

    /// Returns the factory trusting exactly the given certificate sources.
    ///
    /// The sources are canonicalized (sorted, deduplicated) before lookup, so the same sources in
    /// any order map to the same factory. While a returned factory is alive anywhere in the
    /// process, equal inputs yield the identical instance; once the last reference is dropped, the
    /// entry is reclaimable and a later call builds a fresh factory.
    ///
    /// Concurrent callers with equal inputs are collapsed to a single build; callers with
    /// unrelated inputs never wait on each other's builds.
    ///
    /// # Errors
    ///
    /// If any source cannot be read or decoded, or a client configuration cannot be assembled,
    /// an error is returned and nothing is cached.
    pub fn trusted_sources<S>(&self, sources: S) -> Result<Arc<TlsFactory>, TlsError>
    where
        S: Into<CertificateSet>,
    {
        let key = sources.into();

        // Fast path: live entry for this key. Taking the map lock is also when dead entries get
        // swept, keeping the map bounded by the number of live or in-flight keys.
        let build_lock = {
            let mut entries = lock_unpoisoned(&self.entries);
            sweep(&mut entries);

            match entries.get(&key) {
                Some(entry) => {
                    if let Some(factory) = entry.factory.upgrade() {
                        trace!("Reusing cached TLS factory for {} certificate sources.", key.len());
                        return Ok(factory);
                    }

                    // Entry is dead but a build may be in flight; join it.
                    Arc::clone(&entry.build_lock)
                }
                None => {
                    let build_lock = Arc::new(Mutex::new(()));
                    entries.insert(
                        key.clone(),
                        CustomEntry {
                            factory: Weak::new(),
                            build_lock: Arc::clone(&build_lock),
                        },
                    );
                    build_lock
                }
            }
        };

        // Serialize builds for this key only. Whoever gets the lock first builds; everyone else
        // adopts the winner's instance through the re-check below.
        let _guard = lock_unpoisoned(&build_lock);

        {
            let entries = lock_unpoisoned(&self.entries);
            if let Some(factory) = entries.get(&key).and_then(|entry| entry.factory.upgrade()) {
                return Ok(factory);
            }
        }

        let result = TlsFactory::build(TrustPolicy::TrustedSources(key.clone()));

        let mut entries = lock_unpoisoned(&self.entries);
        match result {
            Ok(factory) => {
                let factory = Arc::new(factory);
                debug!("Built TLS factory for {} certificate sources.", key.len());

                match entries.get_mut(&key) {
                    Some(entry) => entry.factory = Arc::downgrade(&factory),
                    // Re-insert if the placeholder vanished.
                    None => {
                        entries.insert(
                            key,
                            CustomEntry {
                                factory: Arc::downgrade(&factory),
                                build_lock: Arc::clone(&build_lock),
                            },
                        );
                    }
                }

                Ok(factory)
            }
            Err(e) => {
                // Failed builds cache nothing. Drop the placeholder unless another caller is
                // already waiting on it to retry.
                if let Some(entry) = entries.get(&key) {
                    let same_flight = Arc::ptr_eq(&entry.build_lock, &build_lock);
                    if same_flight && entry.factory.upgrade().is_none() && Arc::strong_count(&build_lock) <= 2 {
                        entries.remove(&key);
                    }
                }

                Err(e)
            }
        }
    }

    fn singleton(&self, slot: &FactorySlot, policy: TrustPolicy, what: &str) -> Result<Arc<TlsFactory>, TlsError> {
        if let Some(factory) = slot.slot.get() {
            return Ok(Arc::clone(factory));
        }

        let _guard = lock_unpoisoned(&slot.init);
        if let Some(factory) = slot.slot.get() {
            return Ok(Arc::clone(factory));
        }

        let factory = Arc::new(TlsFactory::build(policy)?);
        debug!("Built {} TLS factory.", what);

        // Only set while holding the init lock, and only after re-checking that it is unset.
        slot.slot
            .set(Arc::clone(&factory))
            .expect("should be impossible for factory slot to be initialized twice");

        Ok(factory)
    }

    #[cfg(test)]
    fn raw_custom_entries(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }
}

/// Removes entries whose factory is gone and whose build lock nobody holds.
///
/// An entry with a dead factory but a shared build lock belongs to an in-flight build and must
/// survive the sweep.
fn sweep(entries: &mut HashMap<CertificateSet, CustomEntry, foldhash::quality::RandomState>) {
    let before = entries.len();
    entries.retain(|_, entry| entry.factory.strong_count() > 0 || Arc::strong_count(&entry.build_lock) > 1);

    let removed = before - entries.len();
    if removed > 0 {
        trace!("Swept {} dead TLS factory cache entries.", removed);
    }
}

/// Acquires a mutex, recovering the guard if a previous holder panicked.
///
/// The critical sections in this module never leave shared state partially updated, so a
/// poisoned lock still guards consistent data.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the process-wide factory that accepts any server certificate.
///
/// Delegates to a shared [`TlsFactoryCache`], so every caller in the process shares one instance.
/// See [`TlsFactoryCache::trust_all`].
pub fn trust_all_factory() -> Result<Arc<TlsFactory>, TlsError> {
    SHARED_CACHE.trust_all()
}

/// Returns the process-wide factory trusting exactly the given certificate sources.
///
/// Delegates to a shared [`TlsFactoryCache`], so callers across the process that pass equal
/// sources share one instance. See [`TlsFactoryCache::trusted_sources`].
pub fn trusted_sources_factory<S>(sources: S) -> Result<Arc<TlsFactory>, TlsError>
where
    S: Into<CertificateSet>,
{
    SHARED_CACHE.trusted_sources(sources)
}

/// Returns the process-wide factory anchored to the platform's native root certificates.
///
/// Delegates to a shared [`TlsFactoryCache`]. See [`TlsFactoryCache::platform`].
pub fn platform_factory() -> Result<Arc<TlsFactory>, TlsError> {
    SHARED_CACHE.platform()
}
