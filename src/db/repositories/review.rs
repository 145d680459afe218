//! Review repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateReviewInput, Review, ReviewWithMaster};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Store a new, unpublished review
    async fn create(&self, input: &CreateReviewInput) -> Result<Review>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>>;

    /// Returns false when the review does not exist
    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    /// Published reviews of a master, newest first
    async fn list_published_by_master(&self, master_id: i64) -> Result<Vec<Review>>;

    /// Newest published reviews across all masters
    async fn latest_published(&self, limit: i64) -> Result<Vec<ReviewWithMaster>>;

    /// All reviews, optionally filtered by publication state, newest first
    async fn list(&self, published: Option<bool>) -> Result<Vec<ReviewWithMaster>>;
}

pub struct SqlxReviewRepository {
    pool: DynDatabasePool,
}

impl SqlxReviewRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReviewRepository> {
        Arc::new(Self::new(pool))
    }
}

const REVIEW_COLUMNS: &str =
    "r.id, r.client_name, r.text, r.rating, r.master_id, r.photo, r.is_published, r.created_at";

const REVIEW_WITH_MASTER: &str = "r.id, r.client_name, r.text, r.rating, r.master_id, r.photo, \
     r.is_published, r.created_at, m.first_name AS master_first_name, m.last_name AS master_last_name";

const INSERT_REVIEW: &str = r#"
    INSERT INTO reviews (client_name, text, rating, master_id, photo, is_published, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl ReviewRepository for SqlxReviewRepository {
    async fn create(&self, input: &CreateReviewInput) -> Result<Review> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_REVIEW)
                .bind(&input.client_name)
                .bind(&input.text)
                .bind(input.rating)
                .bind(input.master_id)
                .bind(&input.photo)
                .bind(false)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create review")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_REVIEW)
                .bind(&input.client_name)
                .bind(&input.text)
                .bind(input.rating)
                .bind(input.master_id)
                .bind(&input.photo)
                .bind(false)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create review")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Review {} vanished after insert", id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>> {
        let sql = format!("SELECT {} FROM reviews r WHERE r.id = ?", REVIEW_COLUMNS);
        let review = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await?
                .as_ref()
                .map(row_to_review_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await?
                .as_ref()
                .map(row_to_review_mysql),
        };
        Ok(review)
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool> {
        let sql = "UPDATE reviews SET is_published = ? WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update review")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update review")?
                .rows_affected(),
        };
        // MySQL reports zero rows when the value is unchanged
        if affected == 0 {
            return Ok(self.get_by_id(id).await?.is_some());
        }
        Ok(true)
    }

    async fn list_published_by_master(&self, master_id: i64) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews r WHERE r.master_id = ? AND r.is_published = ? \
             ORDER BY r.created_at DESC, r.id DESC",
            REVIEW_COLUMNS
        );
        let reviews = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(master_id)
                .bind(true)
                .fetch_all(pool)
                .await
                .context("Failed to list reviews")?
                .iter()
                .map(row_to_review_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(master_id)
                .bind(true)
                .fetch_all(pool)
                .await
                .context("Failed to list reviews")?
                .iter()
                .map(row_to_review_mysql)
                .collect(),
        };
        Ok(reviews)
    }

    async fn latest_published(&self, limit: i64) -> Result<Vec<ReviewWithMaster>> {
        let sql = format!(
            "SELECT {} FROM reviews r INNER JOIN masters m ON m.id = r.master_id \
             WHERE r.is_published = ? ORDER BY r.created_at DESC, r.id DESC LIMIT ?",
            REVIEW_WITH_MASTER
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list latest reviews")?;
                Ok(rows.iter().map(row_to_review_with_master_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list latest reviews")?;
                Ok(rows.iter().map(row_to_review_with_master_mysql).collect())
            }
        }
    }

    async fn list(&self, published: Option<bool>) -> Result<Vec<ReviewWithMaster>> {
        let filter = if published.is_some() {
            "WHERE r.is_published = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM reviews r INNER JOIN masters m ON m.id = r.master_id {} \
             ORDER BY r.created_at DESC, r.id DESC",
            REVIEW_WITH_MASTER, filter
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                if let Some(published) = published {
                    query = query.bind(published);
                }
                let rows = query.fetch_all(pool).await.context("Failed to list reviews")?;
                Ok(rows.iter().map(row_to_review_with_master_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                if let Some(published) = published {
                    query = query.bind(published);
                }
                let rows = query.fetch_all(pool).await.context("Failed to list reviews")?;
                Ok(rows.iter().map(row_to_review_with_master_mysql).collect())
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn row_to_review_sqlite(row: &sqlx::sqlite::SqliteRow) -> Review {
    Review {
        id: row.get("id"),
        client_name: row.get("client_name"),
        text: row.get("text"),
        rating: row.get("rating"),
        master_id: row.get("master_id"),
        photo: row.get("photo"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_review_with_master_sqlite(row: &sqlx::sqlite::SqliteRow) -> ReviewWithMaster {
    let first: String = row.get("master_first_name");
    let last: String = row.get("master_last_name");
    ReviewWithMaster {
        review: row_to_review_sqlite(row),
        master_name: format!("{} {}", first, last),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

fn row_to_review_mysql(row: &sqlx::mysql::MySqlRow) -> Review {
    Review {
        id: row.get("id"),
        client_name: row.get("client_name"),
        text: row.get("text"),
        rating: row.get("rating"),
        master_id: row.get("master_id"),
        photo: row.get("photo"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_review_with_master_mysql(row: &sqlx::mysql::MySqlRow) -> ReviewWithMaster {
    let first: String = row.get("master_first_name");
    let last: String = row.get("master_last_name");
    ReviewWithMaster {
        review: row_to_review_mysql(row),
        master_name: format!("{} {}", first, last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{MasterRepository, SqlxMasterRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::MasterInput;

    async fn setup() -> (SqlxReviewRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let master = SqlxMasterRepository::new(pool.clone())
            .create(&MasterInput {
                first_name: "Иван".into(),
                last_name: "Петров".into(),
                middle_name: None,
                phone: "+7".into(),
                address: None,
                photo: None,
                experience: 1,
                is_active: true,
                service_ids: vec![],
            })
            .await
            .unwrap();
        (SqlxReviewRepository::new(pool), master.id)
    }

    fn input(master_id: i64, text: &str) -> CreateReviewInput {
        CreateReviewInput {
            client_name: "Клиент".into(),
            text: text.into(),
            rating: 5,
            master_id,
            photo: None,
        }
    }

    #[tokio::test]
    async fn test_reviews_start_unpublished() {
        let (repo, master_id) = setup().await;
        let review = repo.create(&input(master_id, "Отлично")).await.unwrap();
        assert!(!review.is_published);
        assert!(repo.list_published_by_master(master_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_and_list() {
        let (repo, master_id) = setup().await;
        let first = repo.create(&input(master_id, "Первый")).await.unwrap();
        let second = repo.create(&input(master_id, "Второй")).await.unwrap();
        repo.create(&input(master_id, "Скрытый")).await.unwrap();

        assert!(repo.set_published(first.id, true).await.unwrap());
        assert!(repo.set_published(second.id, true).await.unwrap());
        assert!(!repo.set_published(999, true).await.unwrap());

        let published = repo.list_published_by_master(master_id).await.unwrap();
        assert_eq!(published.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let latest = repo.latest_published(1).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].master_name, "Иван Петров");

        assert_eq!(repo.list(None).await.unwrap().len(), 3);
        assert_eq!(repo.list(Some(false)).await.unwrap().len(), 1);
    }
}
