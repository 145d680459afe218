//! Masters: public profiles with view counting, and staff management
//!
//! A profile view bumps the persistent counter at most once per visitor.
//! The visitor's list of seen masters is checked first and the counter is
//! incremented in the database with a single atomic update.

use anyhow::Context;
use std::sync::Arc;

use crate::db::repositories::{MasterRepository, ReviewRepository, ServiceRepository};
use crate::models::{Master, MasterInput, MasterProfile, MasterWithRating, RatingBucket, Review, Service};
use crate::services::catalog::{CatalogError, CatalogService};
use crate::services::form::FieldErrors;
use crate::services::visitor::{ViewedKind, VisitorStore};

/// Master detail page data
#[derive(Debug, Clone, serde::Serialize)]
pub struct MasterPage {
    pub profile: MasterProfile,
    /// Published reviews, newest first
    pub reviews: Vec<Review>,
}

pub struct MasterService {
    master_repo: Arc<dyn MasterRepository>,
    service_repo: Arc<dyn ServiceRepository>,
    review_repo: Arc<dyn ReviewRepository>,
    visitors: VisitorStore,
    catalog: Arc<CatalogService>,
}

impl MasterService {
    pub fn new(
        master_repo: Arc<dyn MasterRepository>,
        service_repo: Arc<dyn ServiceRepository>,
        review_repo: Arc<dyn ReviewRepository>,
        visitors: VisitorStore,
        catalog: Arc<CatalogService>,
    ) -> Self {
        Self {
            master_repo,
            service_repo,
            review_repo,
            visitors,
            catalog,
        }
    }

    pub async fn get(&self, id: i64) -> Result<Master, CatalogError> {
        self.master_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("master {}", id)))
    }

    pub async fn profile(&self, id: i64) -> Result<MasterProfile, CatalogError> {
        let master = self.get(id).await?;
        let services = self.service_repo.list_by_master(id).await?;
        Ok(MasterProfile {
            full_name: master.full_name(),
            master,
            services,
        })
    }

    /// Detail page for `visitor_id`, counting the view on the first visit
    pub async fn view_page(&self, id: i64, visitor_id: &str) -> Result<MasterPage, CatalogError> {
        let mut profile = self.profile(id).await?;

        let first_view = match self.visitors.mark_viewed(visitor_id, ViewedKind::Master, id).await {
            Ok(first_view) => first_view,
            Err(e) => {
                tracing::warn!(master_id = id, error = %e, "Failed to read visitor state, not counting view");
                false
            }
        };

        if first_view {
            if let Some(count) = self
                .master_repo
                .increment_view(id)
                .await
                .context("Failed to count master view")?
            {
                tracing::debug!(master_id = id, view_count = count, "Master view counted");
                profile.master.view_count = count;
            }
        }

        let reviews = self.review_repo.list_published_by_master(id).await?;
        Ok(MasterPage { profile, reviews })
    }

    /// Services a master offers, for the booking form
    pub async fn services_of(&self, id: i64) -> Result<Vec<Service>, CatalogError> {
        self.get(id).await?;
        Ok(self.service_repo.list_by_master(id).await?)
    }

    pub async fn active_count(&self) -> Result<i64, CatalogError> {
        Ok(self.master_repo.count_active().await?)
    }

    pub async fn list_active(&self) -> Result<Vec<Master>, CatalogError> {
        Ok(self.master_repo.list_active().await?)
    }

    /// All masters with ratings, optionally limited to one rating bucket
    pub async fn list_with_rating(&self, bucket: Option<RatingBucket>) -> Result<Vec<MasterWithRating>, CatalogError> {
        let masters = self.master_repo.list_with_rating().await?;
        Ok(match bucket {
            Some(bucket) => masters
                .into_iter()
                .filter(|m| bucket.contains(m.avg_rating))
                .collect(),
            None => masters,
        })
    }

    async fn validate(&self, input: &MasterInput) -> Result<MasterInput, CatalogError> {
        let mut errors = FieldErrors::new();
        let mut input = input.clone();

        input.first_name = input.first_name.trim().to_string();
        input.last_name = input.last_name.trim().to_string();
        input.phone = input.phone.trim().to_string();

        if input.first_name.is_empty() {
            errors.add("first_name", "Укажите имя мастера");
        }
        if input.last_name.is_empty() {
            errors.add("last_name", "Укажите фамилию мастера");
        }
        if input.phone.is_empty() {
            errors.add("phone", "Укажите телефон мастера");
        }
        if input.experience < 0 {
            errors.add("experience", "Стаж не может быть отрицательным");
        }

        input.service_ids.sort_unstable();
        input.service_ids.dedup();
        if !input.service_ids.is_empty() {
            let found = self.service_repo.get_many(&input.service_ids).await?;
            if found.len() != input.service_ids.len() {
                errors.add("service_ids", "Выбраны несуществующие услуги");
            }
        }

        errors.into_result(input).map_err(CatalogError::Validation)
    }

    pub async fn create(&self, input: &MasterInput) -> Result<Master, CatalogError> {
        let input = self.validate(input).await?;
        let master = self.master_repo.create(&input).await?;
        tracing::info!(master_id = master.id, "Master created");
        self.catalog.invalidate().await;
        Ok(master)
    }

    pub async fn update(&self, id: i64, input: &MasterInput) -> Result<Master, CatalogError> {
        self.get(id).await?;
        let input = self.validate(input).await?;
        let master = self.master_repo.update(id, &input).await?;
        tracing::info!(master_id = id, "Master updated");
        self.catalog.invalidate().await;
        Ok(master)
    }

    /// Bulk (de)activation; returns how many masters changed
    pub async fn set_active(&self, ids: &[i64], is_active: bool) -> Result<u64, CatalogError> {
        let changed = self.master_repo.set_active(ids, is_active).await?;
        tracing::info!(changed, is_active, "Masters activation changed");
        self.catalog.invalidate().await;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::SessionConfig;
    use crate::db::repositories::{
        ReviewRepository, SqlxMasterRepository, SqlxReviewRepository, SqlxServiceRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CreateReviewInput, ServiceInput};
    use rust_decimal::Decimal;

    struct Fixture {
        masters: MasterService,
        catalog: Arc<CatalogService>,
        pool: DynDatabasePool,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let cache = Arc::new(MemoryCache::new());
        let catalog = Arc::new(CatalogService::new(
            SqlxServiceRepository::boxed(pool.clone()),
            SqlxMasterRepository::boxed(pool.clone()),
            cache.clone(),
        ));
        let masters = MasterService::new(
            SqlxMasterRepository::boxed(pool.clone()),
            SqlxServiceRepository::boxed(pool.clone()),
            SqlxReviewRepository::boxed(pool.clone()),
            VisitorStore::new(cache, &SessionConfig::default()),
            catalog.clone(),
        );
        Fixture { masters, catalog, pool }
    }

    fn master_input(service_ids: Vec<i64>) -> MasterInput {
        MasterInput {
            first_name: " Алексей ".to_string(),
            last_name: "Смирнов".to_string(),
            middle_name: None,
            phone: "+79990000000".to_string(),
            address: None,
            photo: None,
            experience: 7,
            is_active: true,
            service_ids,
        }
    }

    async fn add_service(pool: &DynDatabasePool, name: &str) -> Service {
        SqlxServiceRepository::new(pool.clone())
            .create(&ServiceInput {
                name: name.to_string(),
                description: "Описание".to_string(),
                price: Decimal::new(1000, 0),
                duration_minutes: 30,
                is_popular: false,
                image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_view_counted_once_per_visitor() {
        let fx = setup().await;
        let master = fx.masters.create(&master_input(vec![])).await.unwrap();
        assert_eq!(master.first_name, "Алексей");

        let page = fx.masters.view_page(master.id, "visitor-a").await.unwrap();
        assert_eq!(page.profile.master.view_count, 1);
        let page = fx.masters.view_page(master.id, "visitor-a").await.unwrap();
        assert_eq!(page.profile.master.view_count, 1);
        let page = fx.masters.view_page(master.id, "visitor-b").await.unwrap();
        assert_eq!(page.profile.master.view_count, 2);

        assert!(matches!(
            fx.masters.view_page(999, "visitor-a").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_page_shows_published_reviews_only() {
        let fx = setup().await;
        let master = fx.masters.create(&master_input(vec![])).await.unwrap();
        let reviews = SqlxReviewRepository::new(fx.pool.clone());
        for text in ["Первый", "Второй"] {
            let review = reviews
                .create(&CreateReviewInput {
                    client_name: "Клиент".to_string(),
                    text: text.to_string(),
                    rating: 5,
                    master_id: master.id,
                    photo: None,
                })
                .await
                .unwrap();
            if text == "Второй" {
                reviews.set_published(review.id, true).await.unwrap();
            }
        }

        let page = fx.masters.view_page(master.id, "v").await.unwrap();
        assert_eq!(page.reviews.len(), 1);
        assert_eq!(page.reviews[0].text, "Второй");
    }

    #[tokio::test]
    async fn test_create_validates_input_and_services() {
        let fx = setup().await;

        let mut input = master_input(vec![404]);
        input.last_name = " ".to_string();
        input.experience = -1;
        match fx.masters.create(&input).await {
            Err(CatalogError::Validation(errors)) => {
                assert!(errors.has("last_name"));
                assert!(errors.has("experience"));
                assert!(errors.has("service_ids"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|m| m.id)),
        }
    }

    #[tokio::test]
    async fn test_services_and_landing_invalidation() {
        let fx = setup().await;
        let haircut = add_service(&fx.pool, "Стрижка").await;
        let shave = add_service(&fx.pool, "Бритьё").await;

        assert!(fx.catalog.landing().await.unwrap().masters.is_empty());

        let master = fx
            .masters
            .create(&master_input(vec![haircut.id, shave.id, haircut.id]))
            .await
            .unwrap();
        assert_eq!(fx.masters.services_of(master.id).await.unwrap().len(), 2);
        assert_eq!(fx.catalog.landing().await.unwrap().masters.len(), 1);

        assert_eq!(fx.masters.set_active(&[master.id], false).await.unwrap(), 1);
        assert!(fx.catalog.landing().await.unwrap().masters.is_empty());
        assert_eq!(fx.masters.active_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rating_filter() {
        let fx = setup().await;
        let rated = fx.masters.create(&master_input(vec![])).await.unwrap();
        fx.masters.create(&master_input(vec![])).await.unwrap();

        let reviews = SqlxReviewRepository::new(fx.pool.clone());
        for rating in [4, 5] {
            let review = reviews
                .create(&CreateReviewInput {
                    client_name: "Клиент".to_string(),
                    text: "Хорошо".to_string(),
                    rating,
                    master_id: rated.id,
                    photo: None,
                })
                .await
                .unwrap();
            reviews.set_published(review.id, true).await.unwrap();
        }

        let high = fx.masters.list_with_rating(Some(RatingBucket::High)).await.unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].avg_rating, 4.5);
        assert_eq!(high[0].stars, "⭐⭐⭐⭐");

        let unrated = fx.masters.list_with_rating(Some(RatingBucket::NoRating)).await.unwrap();
        assert_eq!(unrated.len(), 1);
        assert_eq!(fx.masters.list_with_rating(None).await.unwrap().len(), 2);
    }
}
