//! Cache system for LLM calls (in-process LRU+TTL, grounded on the
//! teacher's `cache` module shape — a generic `Cache<K, V>` trait with an
//! in-memory implementation).

mod in_memory;

pub use in_memory::InMemoryCache;

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V>;
    async fn set(&self, key: K, value: V, ttl: Option<Duration>);
}
