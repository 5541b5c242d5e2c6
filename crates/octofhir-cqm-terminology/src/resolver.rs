//! Cached value set resolution

use crate::{
    ResolvedTerminology, TerminologyError, TerminologyResult, TerminologySource, ValueSetExpansion,
    ValueSetKey,
};
use futures::future::try_join_all;
use octofhir_cqm_ast::Library;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How long a fetched expansion is served from the cache
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on a single source fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct CacheEntry {
    expansion: Arc<ValueSetExpansion>,
    fetched_at: Instant,
}

/// Value set resolver with a TTL cache in front of a [`TerminologySource`].
///
/// One resolver is shared (behind an `Arc`) by all concurrent evaluations.
/// Concurrent misses for the same key may both fetch; the last write wins.
pub struct TerminologyResolver {
    source: Arc<dyn TerminologySource>,
    cache: RwLock<HashMap<ValueSetKey, CacheEntry>>,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl TerminologyResolver {
    pub fn new(source: Arc<dyn TerminologySource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expansion of `url` (at `version`, when given).
    ///
    /// A fresh cache entry is returned without touching the source. Otherwise
    /// the source is asked; a successful fetch is cached before returning, a
    /// failed or timed-out one leaves the cache as it was.
    pub async fn resolve(&self, url: &str, version: Option<&str>) -> TerminologyResult<Arc<ValueSetExpansion>> {
        self.resolve_key(&ValueSetKey::new(url, version)).await
    }

    pub async fn resolve_key(&self, key: &ValueSetKey) -> TerminologyResult<Arc<ValueSetExpansion>> {
        if let Some(expansion) = self.cached(key) {
            log::debug!("Terminology cache hit for {key}");
            return Ok(expansion);
        }
        log::debug!("Terminology cache miss for {key}");

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_expansion(key)).await {
            Ok(Ok(expansion)) => Arc::new(expansion),
            Ok(Err(err)) => {
                log::warn!("Failed to expand value set {key}: {err}");
                return Err(TerminologyError::Unavailable {
                    url: key.to_string(),
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                log::warn!(
                    "Expanding value set {key} timed out after {}ms",
                    self.fetch_timeout.as_millis()
                );
                return Err(TerminologyError::Unavailable {
                    url: key.to_string(),
                    reason: format!("timed out after {}ms", self.fetch_timeout.as_millis()),
                });
            }
        };

        {
            let mut cache = self.cache.write();
            cache.insert(
                key.clone(),
                CacheEntry {
                    expansion: Arc::clone(&fetched),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(fetched)
    }

    /// Resolve every key concurrently into a snapshot for one run.
    ///
    /// Fails with the first error; expansions fetched before the failure stay
    /// cached.
    pub async fn resolve_all<I>(&self, keys: I) -> TerminologyResult<ResolvedTerminology>
    where
        I: IntoIterator<Item = ValueSetKey>,
    {
        let keys: BTreeSet<ValueSetKey> = keys.into_iter().collect();
        let expansions = try_join_all(keys.iter().map(|key| self.resolve_key(key))).await?;

        let mut resolved = ResolvedTerminology::new();
        for (key, expansion) in keys.into_iter().zip(expansions) {
            resolved.insert(key, expansion);
        }
        log::debug!("Resolved {} value sets", resolved.len());
        Ok(resolved)
    }

    /// Resolve every value set `library` declares
    pub async fn resolve_library(&self, library: &Library) -> TerminologyResult<ResolvedTerminology> {
        self.resolve_all(library.required_valuesets().iter().map(ValueSetKey::from))
            .await
    }

    /// Drop every cached expansion
    pub fn clear(&self) {
        let mut cache = self.cache.write();
        cache.clear();
    }

    /// Number of entries currently cached, expired ones included
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    fn cached(&self, key: &ValueSetKey) -> Option<Arc<ValueSetExpansion>> {
        {
            let cache = self.cache.read();
            match cache.get(key) {
                Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                    return Some(Arc::clone(&entry.expansion));
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: remove unless another task refreshed it meanwhile
        let mut cache = self.cache.write();
        if cache
            .get(key)
            .is_some_and(|entry| entry.fetched_at.elapsed() >= self.ttl)
        {
            log::debug!("Terminology cache entry for {key} expired");
            cache.remove(key);
        }
        None
    }
}

impl std::fmt::Debug for TerminologyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyResolver")
            .field("cached", &self.cached_len())
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}
