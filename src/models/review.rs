//! Review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client testimonial about a master. Starts unpublished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub client_name: String,
    pub text: String,
    /// 1 to 5
    pub rating: i64,
    pub master_id: i64,
    pub photo: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Validated review submission
#[derive(Debug, Clone)]
pub struct CreateReviewInput {
    pub client_name: String,
    pub text: String,
    pub rating: i64,
    pub master_id: i64,
    pub photo: Option<String>,
}

/// Review joined with its master's name, for staff listings
#[derive(Debug, Clone, Serialize)]
pub struct ReviewWithMaster {
    #[serde(flatten)]
    pub review: Review,
    pub master_name: String,
}
