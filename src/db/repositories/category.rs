//! Blog category repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert `category` (its id is ignored)
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const CATEGORY_COLUMNS: &str = "id, name, slug, description, cover";

const INSERT_CATEGORY: &str =
    "INSERT INTO categories (name, slug, description, cover) VALUES (?, ?, ?, ?)";

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_CATEGORY)
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(&category.cover)
                .execute(pool)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_CATEGORY)
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(&category.cover)
                .execute(pool)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };
        Ok(Category {
            id,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        let category = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await?
                .as_ref()
                .map(row_to_category_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await?
                .as_ref()
                .map(row_to_category_mysql),
        };
        Ok(category)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        let category = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get category by slug")?
                .as_ref()
                .map(row_to_category_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get category by slug")?
                .as_ref()
                .map(row_to_category_mysql),
        };
        Ok(category)
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY name, id", CATEGORY_COLUMNS);
        let categories = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(row_to_category_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(row_to_category_mysql)
                .collect(),
        };
        Ok(categories)
    }
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        cover: row.get("cover"),
    }
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        cover: row.get("cover"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxCategoryRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxCategoryRepository::new(pool)
    }

    fn category(name: &str, slug: &str) -> Category {
        Category {
            id: 0,
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            cover: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup_test_repo().await;
        let created = repo.create(&category("Уход", "ukhod")).await.unwrap();
        assert!(created.id > 0);

        assert_eq!(repo.get_by_slug("ukhod").await.unwrap(), Some(created.clone()));
        assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created));
        assert!(repo.slug_exists("ukhod").await.unwrap());
        assert!(!repo.slug_exists("strizhki").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&category("A", "same")).await.unwrap();
        assert!(repo.create(&category("B", "same")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_sorted_by_name() {
        let repo = setup_test_repo().await;
        repo.create(&category("Бороды", "borody")).await.unwrap();
        repo.create(&category("Афиша", "afisha")).await.unwrap();

        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Афиша", "Бороды"]);
    }
}
