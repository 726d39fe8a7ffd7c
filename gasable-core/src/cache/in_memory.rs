//! In-memory LRU+TTL cache. Used to collapse duplicate `(model, text)`
//! embedding/chat calls (spec §4.2: "clients implement an in-process LRU
//! with TTL ≈ 10 min keyed by `(model, text)`").

use super::Cache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: usize = 2048;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
    inserted_at: Instant,
}

/// Read-mostly, safe for concurrent access behind a single mutex — the
/// critical section is a hashmap lookup/insert, never I/O (spec §5 shared
/// resources: "Embedding LRU cache: read-mostly... safe concurrent access").
pub struct InMemoryCache<K, V> {
    capacity: usize,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn evict_if_full(&self, entries: &mut HashMap<K, Entry<V>>) {
        if entries.len() < self.capacity {
            return;
        }
        if let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, e)| e.inserted_at)
            .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest);
        }
    }
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(e) if e.expires_at.map(|t| Instant::now() < t).unwrap_or(true) => {
                Some(e.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut entries = self.entries.lock().unwrap();
        self.evict_if_full(&mut entries);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hits_before_ttl_misses_after() {
        let cache: InMemoryCache<String, i32> = InMemoryCache::new();
        cache.set("k".to_string(), 1, Some(Duration::from_millis(20))).await;
        assert_eq!(cache.get(&"k".to_string()).await, Some(1));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
    }
}
