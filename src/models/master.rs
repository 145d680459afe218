//! Master (barber) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::Service;

/// A barber working at the shop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Master {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub phone: String,
    pub address: Option<String>,
    pub photo: Option<String>,
    /// Years of experience
    pub experience: i64,
    pub is_active: bool,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Master {
    /// "First Last" as shown in lists and notifications
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Master fields for create and update, with the offered service ids
#[derive(Debug, Clone, Deserialize)]
pub struct MasterInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub experience: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub service_ids: Vec<i64>,
}

fn default_active() -> bool {
    true
}

/// Master with the services they offer, for the detail page
#[derive(Debug, Clone, Serialize)]
pub struct MasterProfile {
    #[serde(flatten)]
    pub master: Master,
    pub full_name: String,
    pub services: Vec<Service>,
}

/// Master with aggregated review rating, for staff listings
#[derive(Debug, Clone, Serialize)]
pub struct MasterWithRating {
    #[serde(flatten)]
    pub master: Master,
    pub full_name: String,
    /// Mean of published review ratings, 0 when there are none
    pub avg_rating: f64,
    pub review_count: i64,
    pub stars: &'static str,
}

impl MasterWithRating {
    pub fn new(master: Master, avg_rating: f64, review_count: i64) -> Self {
        Self {
            full_name: master.full_name(),
            master,
            avg_rating,
            review_count,
            stars: rating_stars(avg_rating),
        }
    }
}

/// Star string for an average rating
pub fn rating_stars(rating: f64) -> &'static str {
    if rating > 0.0 && rating < 1.0 {
        "🎃"
    } else if (1.0..2.0).contains(&rating) {
        "⭐"
    } else if (2.0..3.0).contains(&rating) {
        "⭐⭐"
    } else if (3.0..4.0).contains(&rating) {
        "⭐⭐⭐"
    } else if (4.0..5.0).contains(&rating) {
        "⭐⭐⭐⭐"
    } else if rating == 5.0 {
        "⭐⭐⭐⭐⭐"
    } else {
        "❌"
    }
}

/// Rating filter buckets for the staff master list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBucket {
    NoRating,
    Low,
    Medium,
    High,
    Perfect,
}

impl RatingBucket {
    pub fn contains(&self, rating: f64) -> bool {
        match self {
            RatingBucket::NoRating => rating == 0.0,
            RatingBucket::Low => rating > 0.0 && rating < 3.0,
            RatingBucket::Medium => (3.0..4.0).contains(&rating),
            RatingBucket::High => (4.0..5.0).contains(&rating),
            RatingBucket::Perfect => rating == 5.0,
        }
    }
}

impl FromStr for RatingBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_rating" => Ok(Self::NoRating),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "perfect" => Ok(Self::Perfect),
            _ => Err(format!("Invalid rating filter: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_stars() {
        assert_eq!(rating_stars(0.0), "❌");
        assert_eq!(rating_stars(0.5), "🎃");
        assert_eq!(rating_stars(1.0), "⭐");
        assert_eq!(rating_stars(3.99), "⭐⭐⭐");
        assert_eq!(rating_stars(4.5), "⭐⭐⭐⭐");
        assert_eq!(rating_stars(5.0), "⭐⭐⭐⭐⭐");
    }

    #[test]
    fn test_rating_buckets() {
        assert!(RatingBucket::NoRating.contains(0.0));
        assert!(RatingBucket::Low.contains(2.9));
        assert!(!RatingBucket::Low.contains(0.0));
        assert!(RatingBucket::Medium.contains(3.0));
        assert!(RatingBucket::High.contains(4.99));
        assert!(RatingBucket::Perfect.contains(5.0));
        assert!(!RatingBucket::High.contains(5.0));
        assert_eq!("no_rating".parse::<RatingBucket>(), Ok(RatingBucket::NoRating));
        assert!("great".parse::<RatingBucket>().is_err());
    }
}
