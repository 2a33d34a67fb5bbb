use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Time-bounded lookup cache with explicit invalidation.
///
/// Replaces the ad-hoc module-level caches the dispatch path would
/// otherwise grow: entries expire after `ttl`, and writers that change the
/// underlying record are expected to call `invalidate`.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CachedEntry<V>>>,
}

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get(key) {
            Some(entry) if now - entry.stored_at < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(
            key,
            CachedEntry {
                value,
                stored_at: now,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache mutex poisoned").clear();
    }
}
