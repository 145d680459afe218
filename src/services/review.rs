//! Client reviews
//!
//! A review is stored unpublished and then passed through the moderation
//! gate; only a clean verdict publishes it. Staff can flip publication by
//! hand afterwards.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{MasterRepository, ReviewRepository};
use crate::models::{CreateReviewInput, Review, ReviewWithMaster};
use crate::services::form::FieldErrors;
use crate::services::moderation::{ContentModerator, ModerationVerdict};
use crate::services::upload::{MediaStore, UploadedFile};

const NAME_MAX_CHARS: usize = 100;
const PHOTO_DIR: &str = "reviews";

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Review not found: {0}")]
    NotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Review form as submitted
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewForm {
    pub client_name: String,
    pub text: String,
    pub rating: String,
    pub master_id: String,
}

impl ReviewForm {
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "client_name" => self.client_name = value,
            "text" => self.text = value,
            "rating" => self.rating = value,
            "master_id" | "master" => self.master_id = value,
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<CreateReviewInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let client_name = self.client_name.trim();
        if client_name.is_empty() {
            errors.add("client_name", "Пожалуйста, укажите ваше имя");
        } else if client_name.chars().count() > NAME_MAX_CHARS {
            errors.add("client_name", "Имя не должно превышать 100 символов");
        }

        let text = self.text.trim();
        if text.is_empty() {
            errors.add("text", "Напишите текст отзыва");
        }

        let rating = match self.rating.trim().parse::<i64>() {
            Ok(rating) if (1..=5).contains(&rating) => rating,
            _ => {
                errors.add("rating", "Оценка должна быть от 1 до 5");
                0
            }
        };

        let master_id = match self.master_id.trim().parse::<i64>() {
            Ok(id) if id > 0 => id,
            _ => {
                errors.add("master_id", "Выберите мастера");
                0
            }
        };

        errors.into_result(CreateReviewInput {
            client_name: client_name.to_string(),
            text: text.to_string(),
            rating,
            master_id,
            photo: None,
        })
    }
}

/// Stored review with the moderation outcome
#[derive(Debug, Clone)]
pub struct SubmittedReview {
    pub review: Review,
    pub verdict: ModerationVerdict,
}

pub struct ReviewService {
    review_repo: Arc<dyn ReviewRepository>,
    master_repo: Arc<dyn MasterRepository>,
    moderator: Arc<dyn ContentModerator>,
    media: MediaStore,
}

impl ReviewService {
    pub fn new(
        review_repo: Arc<dyn ReviewRepository>,
        master_repo: Arc<dyn MasterRepository>,
        moderator: Arc<dyn ContentModerator>,
        media: MediaStore,
    ) -> Self {
        Self {
            review_repo,
            master_repo,
            moderator,
            media,
        }
    }

    /// Validate, store and moderate a review
    pub async fn submit(&self, form: &ReviewForm, photo: Option<UploadedFile>) -> Result<SubmittedReview, ReviewError> {
        let mut errors = FieldErrors::new();
        let mut input = match form.validate() {
            Ok(input) => Some(input),
            Err(field_errors) => {
                errors = field_errors;
                None
            }
        };

        if let Some(valid) = &input {
            let master = self.master_repo.get_by_id(valid.master_id).await?;
            if master.is_none() {
                errors.add("master_id", "Выбранный мастер не найден");
            }
        }
        if let Some(file) = &photo {
            if let Err(e) = self.media.check(file) {
                errors.add("photo", e.to_string());
            }
        }

        let mut input = match input.take() {
            Some(input) if errors.is_empty() => input,
            _ => return Err(ReviewError::Validation(errors)),
        };

        if let Some(file) = &photo {
            let path = self
                .media
                .save_image(PHOTO_DIR, file)
                .await
                .context("Failed to store review photo")?;
            input.photo = Some(path);
        }

        let mut review = self
            .review_repo
            .create(&input)
            .await
            .context("Failed to create review")?;

        let verdict = self.moderator.moderate(&review.text).await;
        if verdict.publishable() {
            self.review_repo.set_published(review.id, true).await?;
            review.is_published = true;
        }

        tracing::info!(
            review_id = review.id,
            master_id = review.master_id,
            verdict = ?verdict,
            published = review.is_published,
            "Review submitted"
        );
        Ok(SubmittedReview { review, verdict })
    }

    /// Latest published reviews for the landing page
    pub async fn latest(&self, limit: i64) -> Result<Vec<ReviewWithMaster>, ReviewError> {
        Ok(self.review_repo.latest_published(limit).await?)
    }

    pub async fn list(&self, published: Option<bool>) -> Result<Vec<ReviewWithMaster>, ReviewError> {
        Ok(self.review_repo.list(published).await?)
    }

    pub async fn set_published(&self, id: i64, is_published: bool) -> Result<(), ReviewError> {
        if !self.review_repo.set_published(id, is_published).await? {
            return Err(ReviewError::NotFound(id));
        }
        tracing::info!(review_id = id, is_published, "Review publication changed by staff");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::db::repositories::{SqlxMasterRepository, SqlxReviewRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::MasterInput;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedModerator(ModerationVerdict);

    #[async_trait]
    impl ContentModerator for FixedModerator {
        async fn moderate(&self, _text: &str) -> ModerationVerdict {
            self.0
        }
    }

    async fn setup(verdict: ModerationVerdict, media_dir: &TempDir) -> (ReviewService, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let masters = SqlxMasterRepository::boxed(pool.clone());
        let master = masters
            .create(&MasterInput {
                first_name: "Олег".to_string(),
                last_name: "Орлов".to_string(),
                middle_name: None,
                phone: "+79991112233".to_string(),
                address: None,
                photo: None,
                experience: 3,
                is_active: true,
                service_ids: vec![],
            })
            .await
            .unwrap();

        let service = ReviewService::new(
            SqlxReviewRepository::boxed(pool.clone()),
            masters,
            Arc::new(FixedModerator(verdict)),
            MediaStore::new(UploadConfig {
                path: media_dir.path().to_path_buf(),
                ..UploadConfig::default()
            }),
        );
        (service, master.id)
    }

    fn form(master_id: i64, rating: &str) -> ReviewForm {
        ReviewForm {
            client_name: "Пётр".to_string(),
            text: "Отличная стрижка".to_string(),
            rating: rating.to_string(),
            master_id: master_id.to_string(),
        }
    }

    #[test]
    fn test_rating_range() {
        for rating in ["0", "6", "x", ""] {
            assert!(form(1, rating).validate().unwrap_err().has("rating"), "rating {:?}", rating);
        }
        for rating in ["1", "5"] {
            assert!(form(1, rating).validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_clean_review_is_published() {
        let dir = TempDir::new().unwrap();
        let (service, master_id) = setup(ModerationVerdict::Approved, &dir).await;

        let submitted = service.submit(&form(master_id, "5"), None).await.unwrap();
        assert!(submitted.review.is_published);
        assert_eq!(service.latest(3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flagged_failed_and_skipped_stay_unpublished() {
        for verdict in [ModerationVerdict::Flagged, ModerationVerdict::Failed, ModerationVerdict::Skipped] {
            let dir = TempDir::new().unwrap();
            let (service, master_id) = setup(verdict, &dir).await;

            let submitted = service.submit(&form(master_id, "4"), None).await.unwrap();
            assert!(!submitted.review.is_published);
            assert_eq!(submitted.verdict, verdict);
            assert!(service.latest(3).await.unwrap().is_empty());
            assert_eq!(service.list(Some(false)).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_photo_is_stored_and_checked() {
        let dir = TempDir::new().unwrap();
        let (service, master_id) = setup(ModerationVerdict::Approved, &dir).await;

        let photo = UploadedFile {
            file_name: "me.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            data: vec![1, 2, 3],
        };
        let submitted = service.submit(&form(master_id, "5"), Some(photo.clone())).await.unwrap();
        let path = submitted.review.photo.unwrap();
        assert!(path.starts_with("reviews/"));
        assert!(dir.path().join(path).exists());

        let mut exe = photo;
        exe.content_type = "application/x-msdownload".to_string();
        match service.submit(&form(master_id, "5"), Some(exe)).await {
            Err(ReviewError::Validation(errors)) => assert!(errors.has("photo")),
            other => panic!("expected validation error, got {:?}", other.map(|r| r.review.id)),
        }
    }

    #[tokio::test]
    async fn test_unknown_master_and_staff_publication() {
        let dir = TempDir::new().unwrap();
        let (service, master_id) = setup(ModerationVerdict::Skipped, &dir).await;

        match service.submit(&form(master_id + 100, "5"), None).await {
            Err(ReviewError::Validation(errors)) => assert!(errors.has("master_id")),
            other => panic!("expected validation error, got {:?}", other.map(|r| r.review.id)),
        }

        let submitted = service.submit(&form(master_id, "3"), None).await.unwrap();
        service.set_published(submitted.review.id, true).await.unwrap();
        assert_eq!(service.latest(3).await.unwrap().len(), 1);
        assert!(matches!(service.set_published(9999, true).await, Err(ReviewError::NotFound(9999))));
    }
}
