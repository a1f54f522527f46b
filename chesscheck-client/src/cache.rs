use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::Instant;

use chesscheck_core::Platform;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Keyed store whose entries expire individually.
#[derive(Debug)]
pub struct TimedCache<K, V> {
    map: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TimedCache<K, V> {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Live value for `key`. An expired entry is dropped on the way.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let map = self.map.read().await;
            match map.get(key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut map = self.map.write().await;
        // Another writer may have refreshed the entry in between
        match map.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let mut map = self.map.write().await;
        map.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove `key`, returning whether a live entry was dropped.
    pub async fn invalidate(&self, key: &K) -> bool {
        let mut map = self.map.write().await;
        map.remove(key)
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.map.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.is_live(now));
        before - map.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let map = self.map.read().await;
        map.values().filter(|entry| entry.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Stable key for an operation on a normalized username.
///
/// Callers must normalize the username first so equivalent spellings
/// collapse onto one entry.
pub fn cache_key(operation: &str, platform: Platform, normalized_username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(platform.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized_username.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_get_set() {
        let cache = TimedCache::new();
        cache.set("key", "value", Duration::from_secs(5)).await;
        assert_eq!(cache.get(&"key").await, Some("value"));
        assert_eq!(cache.get(&"missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry() {
        let cache = TimedCache::new();
        cache.set("key", "value", Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_millis(9)).await;
        assert_eq!(cache.get(&"key").await, Some("value"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&"key").await, None);
        // Lazily evicted
        assert_eq!(cache.map.read().await.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_entry_ttl() {
        let cache = TimedCache::new();
        cache.set("short", 1, Duration::from_secs(1)).await;
        cache.set("long", 2, Duration::from_secs(10)).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"short").await, None);
        assert_eq!(cache.get(&"long").await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = TimedCache::new();
        cache.set("a", 1, Duration::from_secs(1)).await;
        cache.set("b", 2, Duration::from_secs(1)).await;
        cache.set("c", 3, Duration::from_secs(30)).await;
        assert_eq!(cache.len().await, 3);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.sweep_expired().await, 2);
        assert_eq!(cache.sweep_expired().await, 0);
        assert_eq!(cache.get(&"c").await, Some(3));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = TimedCache::new();
        cache.set("key", "value", Duration::from_secs(5)).await;
        assert!(cache.invalidate(&"key").await);
        assert!(!cache.invalidate(&"key").await);
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key("validate_user", Platform::ChessCom, "hikaru");
        let b = cache_key("validate_user", Platform::ChessCom, "hikaru");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_key_separates_inputs() {
        let base = cache_key("validate_user", Platform::ChessCom, "hikaru");
        assert_ne!(base, cache_key("validate_user", Platform::Lichess, "hikaru"));
        assert_ne!(base, cache_key("validate_user", Platform::ChessCom, "Hikaru"));
        assert_ne!(base, cache_key("profile", Platform::ChessCom, "hikaru"));
    }
}
