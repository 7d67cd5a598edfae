use super::{Probe, ProbeError, ProbeLookup};
use crate::types::ProbeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct CacheEntry {
    probe: Arc<Probe>,
    expires_at: Instant,
}

/// TTL cache of probe metadata, shielding the lookup API from repeated
/// calls for the same probe
pub struct ProbeCache {
    entries: RwLock<HashMap<ProbeId, CacheEntry>>,
    lookup: Arc<dyn ProbeLookup>,
    ttl: Duration,
}

impl ProbeCache {
    pub fn new(lookup: Arc<dyn ProbeLookup>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            lookup,
            ttl,
        }
    }

    /// Return the cached probe if fresh, otherwise fetch it via the lookup
    /// service. Lookup failures are returned to the caller and not cached.
    pub async fn get(&self, id: ProbeId) -> Result<Arc<Probe>, ProbeError> {
        if let Some(entry) = self.entries.read().get(&id) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.probe.clone());
            }
        }

        let probe = Arc::new(self.lookup.probe(id).await?);
        self.entries.write().insert(
            id,
            CacheEntry {
                probe: probe.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(probe)
    }

    /// Remove all expired entries, returning the number removed
    pub fn clean_up(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Spawn the periodic cache sweep, bound to the root lifecycle signal
pub fn spawn_cache_cleanup(
    cache: Arc<ProbeCache>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    debug!("Cleaning up probe cache...");
                    let removed = cache.clean_up();
                    if removed > 0 {
                        info!("Probe cache entries removed: {}", removed);
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingLookup {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProbeLookup for CountingLookup {
        async fn probe(&self, id: ProbeId) -> Result<Probe, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProbeError::Status { id, status: 500 });
            }
            Ok(Probe {
                id,
                asn_v4: Some(64500),
                asn_v6: None,
                country_code: Some("NL".to_string()),
                geometry: None,
            })
        }
    }

    #[tokio::test]
    async fn second_get_within_ttl_hits_cache() {
        let lookup = Arc::new(CountingLookup::new(false));
        let cache = ProbeCache::new(lookup.clone(), Duration::from_secs(60));

        let first = cache.get(10).await.unwrap();
        let second = cache.get(10).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn distinct_probes_each_trigger_one_lookup() {
        let lookup = Arc::new(CountingLookup::new(false));
        let cache = ProbeCache::new(lookup.clone(), Duration::from_secs(60));

        cache.get(1).await.unwrap();
        cache.get(2).await.unwrap();
        cache.get(1).await.unwrap();

        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_expired_and_get_refetches() {
        let lookup = Arc::new(CountingLookup::new(false));
        let cache = ProbeCache::new(lookup.clone(), Duration::from_millis(10));

        cache.get(7).await.unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.clean_up(), 1);
        assert!(cache.is_empty());

        cache.get(7).await.unwrap();
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn lookup_failure_is_not_cached() {
        let lookup = Arc::new(CountingLookup::new(true));
        let cache = ProbeCache::new(lookup.clone(), Duration::from_secs(60));

        assert!(cache.get(3).await.is_err());
        assert!(cache.get(3).await.is_err());

        assert!(cache.is_empty());
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn cleanup_keeps_fresh_entries() {
        let lookup = Arc::new(CountingLookup::new(false));
        let cache = ProbeCache::new(lookup.clone(), Duration::from_secs(60));

        cache.get(1).await.unwrap();
        assert_eq!(cache.clean_up(), 0);
        assert_eq!(cache.len(), 1);
    }
}
