//! Per-visitor session state
//!
//! Every browser carries a `visitor` cookie. The state behind it (pages
//! already counted as viewed and pending flash messages) lives in the
//! in-memory cache for as long as the cookie does.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, CacheLayer, MemoryCache};
use crate::config::SessionConfig;

/// Flash message severity, used as a CSS modifier in templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

/// Kind of page whose views are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewedKind {
    Master,
    Post,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitorState {
    #[serde(default)]
    pub viewed_masters: Vec<i64>,
    #[serde(default)]
    pub viewed_posts: Vec<i64>,
    #[serde(default)]
    pub flashes: Vec<FlashMessage>,
}

impl VisitorState {
    fn viewed_mut(&mut self, kind: ViewedKind) -> &mut Vec<i64> {
        match kind {
            ViewedKind::Master => &mut self.viewed_masters,
            ViewedKind::Post => &mut self.viewed_posts,
        }
    }

    /// Record a view. Returns false when `id` was already recorded.
    /// The list keeps at most `cap` ids, dropping the oldest.
    pub fn mark_viewed(&mut self, kind: ViewedKind, id: i64, cap: usize) -> bool {
        let viewed = self.viewed_mut(kind);
        if viewed.contains(&id) {
            return false;
        }
        viewed.push(id);
        if viewed.len() > cap {
            let excess = viewed.len() - cap;
            viewed.drain(..excess);
        }
        true
    }
}

/// Cache-backed store of visitor state
#[derive(Clone)]
pub struct VisitorStore {
    cache: Arc<MemoryCache>,
    ttl: Duration,
    max_viewed_ids: usize,
}

impl VisitorStore {
    pub fn new(cache: Arc<MemoryCache>, config: &SessionConfig) -> Self {
        let days = config.cookie_age_days.max(1) as u64;
        Self {
            cache,
            ttl: Duration::from_secs(days * 24 * 60 * 60),
            max_viewed_ids: config.max_viewed_ids.max(1),
        }
    }

    pub async fn load(&self, visitor_id: &str) -> Result<VisitorState> {
        let state: Option<VisitorState> = self.cache.get(&keys::visitor(visitor_id)).await?;
        Ok(state.unwrap_or_default())
    }

    pub async fn save(&self, visitor_id: &str, state: &VisitorState) -> Result<()> {
        self.cache.set(&keys::visitor(visitor_id), state, self.ttl).await
    }

    /// Record that the visitor saw a page. True the first time only.
    pub async fn mark_viewed(&self, visitor_id: &str, kind: ViewedKind, id: i64) -> Result<bool> {
        let mut state = self.load(visitor_id).await?;
        let first_view = state.mark_viewed(kind, id, self.max_viewed_ids);
        if first_view {
            self.save(visitor_id, &state).await?;
        }
        Ok(first_view)
    }

    pub async fn push_flash(&self, visitor_id: &str, level: FlashLevel, text: impl Into<String>) -> Result<()> {
        let mut state = self.load(visitor_id).await?;
        state.flashes.push(FlashMessage {
            level,
            text: text.into(),
        });
        self.save(visitor_id, &state).await
    }

    /// Remove and return pending flash messages
    pub async fn take_flashes(&self, visitor_id: &str) -> Result<Vec<FlashMessage>> {
        let mut state = self.load(visitor_id).await?;
        if state.flashes.is_empty() {
            return Ok(Vec::new());
        }
        let flashes = std::mem::take(&mut state.flashes);
        self.save(visitor_id, &state).await?;
        Ok(flashes)
    }
}
