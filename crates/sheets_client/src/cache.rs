//! TTL + size-bounded cache for sheet reads.
//!
//! Entries expire after a fixed TTL; past the max-entry bound the
//! least-recently-fetched range is evicted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub document_id: String,
    pub tab: String,
    pub range: String,
}

impl CacheKey {
    pub fn new(document_id: &str, tab: &str, range: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            tab: tab.to_string(),
            range: range.to_string(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    rows: Vec<Vec<String>>,
    fetched_at: Instant,
}

/// Thread-safe cache keyed by (document, tab, range).
#[derive(Debug)]
pub struct SheetCache {
    inner: Mutex<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl SheetCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Vec<String>>> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match map.get(key) {
            Some(entry) if entry.fetched_at.elapsed() <= self.ttl => Some(entry.rows.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, rows: Vec<Vec<String>>) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if map.len() >= self.max_entries && !map.contains_key(&key) {
            // Evict the least-recently-fetched range.
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone())
            {
                map.remove(&oldest);
            }
        }
        map.insert(
            key,
            Entry {
                rows,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(tag: &str) -> Vec<Vec<String>> {
        vec![vec![tag.to_string()]]
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = SheetCache::new(Duration::from_secs(60), 10);
        let key = CacheKey::new("doc", "tab", "A1:B2");
        cache.insert(key.clone(), rows("a"));
        assert_eq!(cache.get(&key), Some(rows("a")));
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = SheetCache::new(Duration::from_millis(0), 10);
        let key = CacheKey::new("doc", "tab", "A1:B2");
        cache.insert(key.clone(), rows("a"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_drops_oldest_fetch() {
        let cache = SheetCache::new(Duration::from_secs(60), 2);
        let k1 = CacheKey::new("doc", "t1", "");
        let k2 = CacheKey::new("doc", "t2", "");
        let k3 = CacheKey::new("doc", "t3", "");
        cache.insert(k1.clone(), rows("1"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(k2.clone(), rows("2"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(k3.clone(), rows("3"));

        assert_eq!(cache.get(&k1), None, "oldest fetch should be evicted");
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k3).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = SheetCache::new(Duration::from_secs(60), 10);
        cache.insert(CacheKey::new("doc", "tab", ""), rows("a"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
