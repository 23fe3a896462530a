use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use super::{BlobStore, CacheEntry, CacheError, DEFAULT_RETENTION};

/// [`BlobStore`] backed by a `HashMap` behind a `RwLock`.
///
/// Nothing bounds the entry count except the retention window; every blob
/// lives until a reap sweep finds it expired.
#[derive(Debug)]
pub struct InMemoryBlobCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    retention: Duration,
}

impl InMemoryBlobCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn put_at(&self, id: &str, bytes: Bytes, created_at: Instant) {
        let entry = CacheEntry {
            id: id.to_string(),
            bytes,
            created_at,
        };
        let size = entry.bytes.len();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), entry);
        debug!(id, size, "blob cached");
    }
}

impl Default for InMemoryBlobCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl BlobStore for InMemoryBlobCache {
    fn put(&self, id: &str, bytes: Bytes) {
        self.put_at(id, bytes, Instant::now());
    }

    fn get(&self, id: &str) -> Result<Bytes, CacheError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(id)
            .filter(|entry| !entry.is_expired(Instant::now(), self.retention))
            .map(|entry| entry.bytes.clone())
            .ok_or_else(|| CacheError::NotFound(id.to_string()))
    }

    fn reap_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.retention));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn retention(&self) -> Duration {
        self.retention
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use bytes::Bytes;

    use super::InMemoryBlobCache;
    use crate::cache::{BlobStore, CacheError};

    #[test]
    fn put_then_get_round_trips() {
        let cache = InMemoryBlobCache::default();
        cache.put("abc", Bytes::from_static(b"jpeg"));
        assert_eq!(cache.get("abc"), Ok(Bytes::from_static(b"jpeg")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let cache = InMemoryBlobCache::default();
        assert_eq!(
            cache.get("missing"),
            Err(CacheError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn reap_keeps_fresh_entries() {
        let cache = InMemoryBlobCache::new(Duration::from_secs(900));
        cache.put("fresh", Bytes::from_static(b"x"));
        assert_eq!(cache.reap(), 0);
        assert!(cache.get("fresh").is_ok());
    }

    #[test]
    fn reap_after_retention_removes_entries() {
        let cache = InMemoryBlobCache::new(Duration::from_secs(900));
        cache.put("old", Bytes::from_static(b"x"));
        cache.put("thumb_old", Bytes::from_static(b"y"));

        let later = Instant::now() + Duration::from_secs(901);
        assert_eq!(cache.reap_expired(later), 2);
        assert!(cache.is_empty());
        assert!(matches!(cache.get("old"), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn expired_entry_is_not_served_before_reap() {
        let cache = InMemoryBlobCache::new(Duration::from_millis(1));
        cache.put("brief", Bytes::from_static(b"x"));
        thread::sleep(Duration::from_millis(20));
        assert!(cache.get("brief").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_get_and_reap_never_tear() {
        let cache = Arc::new(InMemoryBlobCache::new(Duration::from_secs(900)));
        let payload = Bytes::from(vec![7u8; 4096]);
        for idx in 0..64 {
            cache.put(&format!("id-{idx}"), payload.clone());
        }

        let reaper = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let far = Instant::now() + Duration::from_secs(3600);
                cache.reap_expired(far)
            })
        };
        for idx in 0..64 {
            match cache.get(&format!("id-{idx}")) {
                Ok(bytes) => assert_eq!(bytes, payload),
                Err(CacheError::NotFound(_)) => {}
            }
        }
        assert_eq!(reaper.join().unwrap(), 64);
    }
}
