//! Cache layer
//!
//! In-process cache (moka) holding visitor session state and cached
//! catalog data. Values are JSON-serialised so any `Serialize` type fits.
//!
//! # Usage
//!
//! ```rust,ignore
//! use barbershop::cache::{create_cache, CacheLayer};
//! use barbershop::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("key", &"value", Duration::from_secs(60)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The methods are generic, so the trait is not object safe; components
/// hold an `Arc<MemoryCache>` and call through this trait.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value with its own TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Create the cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

/// Cache keys shared across services
pub mod keys {
    /// Landing page catalog (services, masters, popular services)
    pub const LANDING_CATALOG: &str = "catalog:landing";
    /// Every catalog entry
    pub const CATALOG_PATTERN: &str = "catalog:*";

    /// Visitor state (viewed ids, flash messages) for a visitor cookie
    pub fn visitor(visitor_id: &str) -> String {
        format!("visitor:{}", visitor_id)
    }
}
