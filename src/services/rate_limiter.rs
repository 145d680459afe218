//! Rate limiter for login attempts
//!
//! Counts failed logins per identifier (email or username, case-insensitive)
//! inside a sliding window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::LoginLimitConfig;

/// Login rate limiter
pub struct LoginRateLimiter {
    attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    max_attempts: usize,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(config: &LoginLimitConfig) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            max_attempts: config.max_attempts as usize,
            window: Duration::minutes(config.window_minutes),
        }
    }

    fn key(identifier: &str) -> String {
        identifier.trim().to_lowercase()
    }

    /// Whether the identifier has used up its failed attempts in the window
    pub async fn is_limited(&self, identifier: &str) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(&Self::key(identifier)) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len() >= self.max_attempts
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, identifier: &str) {
        let mut attempts = self.attempts.write().await;
        attempts
            .entry(Self::key(identifier))
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, identifier: &str) {
        self.attempts.write().await.remove(&Self::key(identifier));
    }

    /// Drop identifiers whose attempts all fell out of the window
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.attempts.read().await.len()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(&LoginLimitConfig::default())
    }
}
