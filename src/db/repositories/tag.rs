//! Blog tag repository

use crate::db::repositories::service::placeholders;
use crate::db::{Backend, DynDatabasePool};
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Insert `tag` (its id is ignored)
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// All tags ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Tags with the given ids; unknown ids are skipped
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Tag>>;

    /// Tags attached to a post
    async fn get_by_post(&self, post_id: i64) -> Result<Vec<Tag>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_tags(&self, sql: &str, binds: &[i64]) -> Result<Vec<Tag>> {
        let tags = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for id in binds {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to fetch tags")?
                    .iter()
                    .map(|row| Tag {
                        id: row.get("id"),
                        name: row.get("name"),
                        slug: row.get("slug"),
                    })
                    .collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(sql);
                for id in binds {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to fetch tags")?
                    .iter()
                    .map(|row| Tag {
                        id: row.get("id"),
                        name: row.get("name"),
                        slug: row.get("slug"),
                    })
                    .collect()
            }
        };
        Ok(tags)
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let sql = "INSERT INTO tags (name, slug) VALUES (?, ?)";
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&tag.name)
                .bind(&tag.slug)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&tag.name)
                .bind(&tag.slug)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_insert_id() as i64,
        };
        Ok(Tag { id, ..tag.clone() })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let sql = "SELECT id, name, slug FROM tags WHERE slug = ?";
        let tag = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(slug)
                .fetch_optional(pool)
                .await?
                .map(|row| Tag {
                    id: row.get("id"),
                    name: row.get("name"),
                    slug: row.get("slug"),
                }),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(slug)
                .fetch_optional(pool)
                .await?
                .map(|row| Tag {
                    id: row.get("id"),
                    name: row.get("name"),
                    slug: row.get("slug"),
                }),
        };
        Ok(tag)
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        self.fetch_tags("SELECT id, name, slug FROM tags ORDER BY name, id", &[])
            .await
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, slug FROM tags WHERE id IN ({}) ORDER BY name, id",
            placeholders(ids.len())
        );
        self.fetch_tags(&sql, ids).await
    }

    async fn get_by_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        let sql = "SELECT t.id, t.name, t.slug FROM tags t \
                   INNER JOIN post_tags pt ON pt.tag_id = t.id \
                   WHERE pt.post_id = ? ORDER BY t.name, t.id";
        self.fetch_tags(sql, &[post_id]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxTagRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxTagRepository::new(pool)
    }

    fn tag(name: &str, slug: &str) -> Tag {
        Tag {
            id: 0,
            name: name.to_string(),
            slug: slug.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_by_slug() {
        let repo = setup_test_repo().await;
        let created = repo.create(&tag("Борода", "boroda")).await.unwrap();

        let found = repo.get_by_slug("boroda").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(repo.slug_exists("boroda").await.unwrap());
        assert!(repo.create(&tag("Борода 2", "boroda")).await.is_err());
    }

    #[tokio::test]
    async fn test_get_many() {
        let repo = setup_test_repo().await;
        let a = repo.create(&tag("a", "a")).await.unwrap();
        let b = repo.create(&tag("b", "b")).await.unwrap();

        assert_eq!(repo.get_many(&[b.id, a.id, 77]).await.unwrap(), vec![a, b]);
        assert!(repo.get_many(&[]).await.unwrap().is_empty());
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}
