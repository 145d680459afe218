//! In-memory cache implementation using moka
//!
//! Each entry carries its own TTL, enforced through a moka [`Expiry`]
//! policy. Keys can be removed in bulk with glob-style patterns.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cache entries (1 hour)
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// JSON-serialised value plus the TTL it was stored with
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Expire entries after the TTL recorded in the entry; overwriting resets it
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    /// TTL used by callers that have no specific lifetime in mind
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a cache holding at most `max_capacity` entries
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob match where `*` is any run of characters and `?` exactly one
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();

        // Iterative matcher with single backtrack point for the last `*`
        let (mut p, mut k) = (0, 0);
        let mut star: Option<(usize, usize)> = None;
        while k < key.len() {
            if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
                p += 1;
                k += 1;
            } else if p < pattern.len() && pattern[p] == '*' {
                star = Some((p, k));
                p += 1;
            } else if let Some((sp, sk)) = star {
                p = sp + 1;
                k = sk + 1;
                star = Some((sp, sk + 1));
            } else {
                return false;
            }
        }
        pattern[p..].iter().all(|c| *c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_str()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(3600));
        cache.set("short", &1, Duration::from_millis(20)).await.unwrap();
        cache.set("long", &2, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        let short: Option<i32> = cache.get("short").await.unwrap();
        let long: Option<i32> = cache.get("long").await.unwrap();
        assert_eq!(short, None);
        assert_eq!(long, Some(2));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = MemoryCache::new();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.set("b", &2, Duration::from_secs(60)).await.unwrap();

        cache.delete("a").await.unwrap();
        let a: Option<i32> = cache.get("a").await.unwrap();
        assert_eq!(a, None);

        cache.clear().await.unwrap();
        let b: Option<i32> = cache.get("b").await.unwrap();
        assert_eq!(b, None);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        for key in ["catalog:landing", "catalog:popular", "visitor:1"] {
            cache.set(key, &key, Duration::from_secs(60)).await.unwrap();
        }

        cache.delete_pattern("catalog:*").await.unwrap();

        let landing: Option<String> = cache.get("catalog:landing").await.unwrap();
        let popular: Option<String> = cache.get("catalog:popular").await.unwrap();
        let visitor: Option<String> = cache.get("visitor:1").await.unwrap();
        assert_eq!(landing, None);
        assert_eq!(popular, None);
        assert!(visitor.is_some());
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("catalog:*", "catalog:landing"));
        assert!(MemoryCache::pattern_matches("user:?:profile", "user:1:profile"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(MemoryCache::pattern_matches("a*b*c", "axxbyyc"));
        assert!(!MemoryCache::pattern_matches("catalog:*", "visitor:1"));
        assert!(!MemoryCache::pattern_matches("user:?:profile", "user:12:profile"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(50))]

            #[test]
            fn prefix_star_matches_every_extension(prefix in "[a-z:]{0,8}", rest in "[a-z0-9:]{0,12}") {
                let pattern = format!("{}*", prefix);
                let key = format!("{}{}", prefix, rest);
                prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
            }

            #[test]
            fn literal_pattern_matches_only_itself(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
                prop_assert_eq!(MemoryCache::pattern_matches(&a, &b), a == b);
            }
        }
    }
}
