//! Text moderation gate for reviews and comments
//!
//! User text is classified by the Mistral moderation API. Every category
//! score is rounded to two decimals and compared with a threshold table; a
//! text is flagged when any configured category reaches its threshold.
//! Categories the table does not mention are ignored.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::ModerationConfig;

/// Outcome of moderating a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationVerdict {
    /// Clean, may be published
    Approved,
    /// At least one category reached its threshold
    Flagged,
    /// No API key configured; left for staff
    Skipped,
    /// The API call failed; left for staff
    Failed,
}

impl ModerationVerdict {
    /// Only approved text is published automatically
    pub fn publishable(&self) -> bool {
        matches!(self, ModerationVerdict::Approved)
    }
}

/// Something that can judge user-submitted text
#[async_trait]
pub trait ContentModerator: Send + Sync {
    async fn moderate(&self, text: &str) -> ModerationVerdict;
}

/// Round a score to two decimal places
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Whether any thresholded category meets or exceeds its threshold.
///
/// Scores are expected to be rounded already.
pub fn is_flagged(scores: &HashMap<String, f64>, thresholds: &BTreeMap<String, f64>) -> bool {
    scores.iter().any(|(category, score)| {
        thresholds
            .get(category)
            .is_some_and(|threshold| *score >= *threshold)
    })
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: Vec<Vec<ChatMessage<'a>>>,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    category_scores: HashMap<String, f64>,
}

/// Mistral chat moderation client
pub struct MistralModerator {
    client: reqwest::Client,
    config: ModerationConfig,
}

impl MistralModerator {
    pub fn new(config: ModerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build moderation HTTP client")?;

        Ok(Self { client, config })
    }

    /// Fetch rounded category scores for `text`
    async fn category_scores(&self, api_key: &str, text: &str) -> Result<HashMap<String, f64>> {
        let request = ModerationRequest {
            model: &self.config.model,
            input: vec![vec![ChatMessage {
                role: "user",
                content: text,
            }]],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Moderation request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Moderation API returned {}", response.status()));
        }

        let body: ModerationResponse = response
            .json()
            .await
            .context("Failed to parse moderation response")?;

        let scores = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Moderation response has no results"))?
            .category_scores;

        Ok(scores
            .into_iter()
            .map(|(category, score)| (category, round_score(score)))
            .collect())
    }
}

#[async_trait]
impl ContentModerator for MistralModerator {
    async fn moderate(&self, text: &str) -> ModerationVerdict {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            tracing::debug!("Moderation API key not configured, leaving text for staff");
            return ModerationVerdict::Skipped;
        };

        match self.category_scores(api_key, text).await {
            Ok(scores) => {
                if is_flagged(&scores, &self.config.thresholds) {
                    tracing::info!(?scores, "Text flagged by moderation");
                    ModerationVerdict::Flagged
                } else {
                    tracing::debug!("Text passed moderation");
                    ModerationVerdict::Approved
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Moderation call failed, leaving text unpublished");
                ModerationVerdict::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn thresholds(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.104), 0.1);
        assert_eq!(round_score(0.0951), 0.1);
        assert_eq!(round_score(0.0), 0.0);
    }

    #[test]
    fn test_is_flagged() {
        let table = thresholds(&[("sexual", 0.1), ("violence_and_threats", 0.2)]);

        assert!(!is_flagged(&scores(&[("sexual", 0.09), ("violence_and_threats", 0.19)]), &table));
        assert!(is_flagged(&scores(&[("sexual", 0.1)]), &table));
        assert!(is_flagged(&scores(&[("sexual", 0.0), ("violence_and_threats", 0.5)]), &table));
        // Categories without a threshold are ignored
        assert!(!is_flagged(&scores(&[("spam", 0.99)]), &table));
        assert!(!is_flagged(&HashMap::new(), &table));
    }

    #[test]
    fn test_request_shape() {
        let request = ModerationRequest {
            model: "mistral-moderation-latest",
            input: vec![vec![ChatMessage {
                role: "user",
                content: "Отличный мастер",
            }]],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "mistral-moderation-latest");
        assert_eq!(json["input"][0][0]["role"], "user");
        assert_eq!(json["input"][0][0]["content"], "Отличный мастер");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"id":"x","model":"m","results":[{"categories":{"sexual":false},"category_scores":{"sexual":0.013,"pii":0.4}}]}"#;
        let parsed: ModerationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results[0].category_scores["pii"], 0.4);
    }

    #[tokio::test]
    async fn test_missing_api_key_skips() {
        let moderator = MistralModerator::new(ModerationConfig {
            api_key: None,
            ..ModerationConfig::default()
        })
        .unwrap();

        let verdict = moderator.moderate("Отличный мастер").await;
        assert_eq!(verdict, ModerationVerdict::Skipped);
        assert!(!verdict.publishable());
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_closed() {
        let moderator = MistralModerator::new(ModerationConfig {
            api_url: "http://127.0.0.1:9/v1/chat/moderations".to_string(),
            api_key: Some("test-key".to_string()),
            timeout_seconds: 2,
            ..ModerationConfig::default()
        })
        .unwrap();

        assert_eq!(moderator.moderate("текст").await, ModerationVerdict::Failed);
    }

    proptest! {
        #[test]
        fn flagged_iff_some_score_reaches_threshold(
            raw in proptest::collection::vec(0.0f64..1.0, 3),
            limit in 0.0f64..1.0,
        ) {
            let names = ["sexual", "health", "law"];
            let table: BTreeMap<String, f64> = names.iter().map(|n| (n.to_string(), limit)).collect();
            let scores: HashMap<String, f64> = names
                .iter()
                .zip(&raw)
                .map(|(n, s)| (n.to_string(), round_score(*s)))
                .collect();

            let expected = scores.values().any(|s| *s >= limit);
            prop_assert_eq!(is_flagged(&scores, &table), expected);
        }

        #[test]
        fn empty_threshold_table_never_flags(raw in proptest::collection::vec(0.0f64..1.0, 0..5)) {
            let scores: HashMap<String, f64> = raw
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("c{}", i), *s))
                .collect();
            prop_assert!(!is_flagged(&scores, &BTreeMap::new()));
        }
    }
}
