//! Comment and like repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Comment, CommentWithMeta, LikeTargetType};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// New comment as accepted by the comment service
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub text: String,
    pub is_published: bool,
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &NewComment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments of a post, oldest first, with author and like count
    async fn list_by_post(&self, post_id: i64, published_only: bool) -> Result<Vec<CommentWithMeta>>;

    /// Returns false when the comment does not exist
    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    /// Like or unlike, returning whether the target is now liked by `user_id`
    async fn toggle_like(&self, target: LikeTargetType, target_id: i64, user_id: i64) -> Result<bool>;

    async fn like_count(&self, target: LikeTargetType, target_id: i64) -> Result<i64>;
}

pub struct CommentRepositoryImpl {
    pool: DynDatabasePool,
}

impl CommentRepositoryImpl {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, c.parent_id, c.text, c.is_published, c.created_at, c.updated_at";

const INSERT_COMMENT: &str = r#"
    INSERT INTO comments (post_id, author_id, parent_id, text, is_published, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

macro_rules! row_to_comment {
    ($row:expr) => {
        Comment {
            id: $row.get("id"),
            post_id: $row.get("post_id"),
            author_id: $row.get("author_id"),
            parent_id: $row.get("parent_id"),
            text: $row.get("text"),
            is_published: $row.get("is_published"),
            created_at: $row.get("created_at"),
            updated_at: $row.get("updated_at"),
        }
    };
}

macro_rules! row_to_comment_with_meta {
    ($row:expr) => {
        CommentWithMeta {
            comment: row_to_comment!($row),
            author_name: $row.get("author_name"),
            like_count: $row.get("like_count"),
            replies: Vec::new(),
        }
    };
}

#[async_trait]
impl CommentRepository for CommentRepositoryImpl {
    async fn create(&self, comment: &NewComment) -> Result<Comment> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_COMMENT)
                .bind(comment.post_id)
                .bind(comment.author_id)
                .bind(comment.parent_id)
                .bind(&comment.text)
                .bind(comment.is_published)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_COMMENT)
                .bind(comment.post_id)
                .bind(comment.author_id)
                .bind(comment.parent_id)
                .bind(&comment.text)
                .bind(comment.is_published)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Comment {} vanished after insert", id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments c WHERE c.id = ?", COMMENT_COLUMNS);
        let comment = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await?
                .map(|row| row_to_comment!(row)),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await?
                .map(|row| row_to_comment!(row)),
        };
        Ok(comment)
    }

    async fn list_by_post(&self, post_id: i64, published_only: bool) -> Result<Vec<CommentWithMeta>> {
        let filter = if published_only {
            "AND c.is_published = ?"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT {}, u.username AS author_name,
                   (SELECT COUNT(*) FROM likes l
                    WHERE l.target_type = 'comment' AND l.target_id = c.id) AS like_count
            FROM comments c
            LEFT JOIN users u ON u.id = c.author_id
            WHERE c.post_id = ? {}
            ORDER BY c.created_at ASC, c.id ASC
            "#,
            COMMENT_COLUMNS, filter
        );

        let comments = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql).bind(post_id);
                if published_only {
                    query = query.bind(true);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to list comments")?
                    .iter()
                    .map(|row| row_to_comment_with_meta!(row))
                    .collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql).bind(post_id);
                if published_only {
                    query = query.bind(true);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to list comments")?
                    .iter()
                    .map(|row| row_to_comment_with_meta!(row))
                    .collect()
            }
        };
        Ok(comments)
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool> {
        let sql = "UPDATE comments SET is_published = ?, updated_at = ? WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(is_published)
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(is_published)
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn toggle_like(&self, target: LikeTargetType, target_id: i64, user_id: i64) -> Result<bool> {
        let delete = "DELETE FROM likes WHERE target_type = ? AND target_id = ? AND user_id = ?";
        let target = target.to_string();
        let now = Utc::now();

        let liked = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let removed = sqlx::query(delete)
                    .bind(&target)
                    .bind(target_id)
                    .bind(user_id)
                    .execute(pool)
                    .await?
                    .rows_affected();
                if removed == 0 {
                    sqlx::query(
                        "INSERT OR IGNORE INTO likes (target_type, target_id, user_id, created_at) \
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(&target)
                    .bind(target_id)
                    .bind(user_id)
                    .bind(now)
                    .execute(pool)
                    .await
                    .context("Failed to add like")?;
                }
                removed == 0
            }
            Backend::Mysql(pool) => {
                let removed = sqlx::query(delete)
                    .bind(&target)
                    .bind(target_id)
                    .bind(user_id)
                    .execute(pool)
                    .await?
                    .rows_affected();
                if removed == 0 {
                    sqlx::query(
                        "INSERT IGNORE INTO likes (target_type, target_id, user_id, created_at) \
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(&target)
                    .bind(target_id)
                    .bind(user_id)
                    .bind(now)
                    .execute(pool)
                    .await
                    .context("Failed to add like")?;
                }
                removed == 0
            }
        };
        Ok(liked)
    }

    async fn like_count(&self, target: LikeTargetType, target_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM likes WHERE target_type = ? AND target_id = ?";
        let target = target.to_string();
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&target)
                .bind(target_id)
                .fetch_one(pool)
                .await?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&target)
                .bind(target_id)
                .fetch_one(pool)
                .await?
                .get("count"),
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{PostRepository, SqlxPostRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Post, User, UserRole};

    async fn setup() -> (CommentRepositoryImpl, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("reader".into(), "r@example.com".into(), "h".into(), UserRole::Client))
            .await
            .unwrap();
        let now = Utc::now();
        let post = SqlxPostRepository::new(pool.clone())
            .create(
                &Post {
                    id: 0,
                    title: "T".into(),
                    slug: "t".into(),
                    cover: None,
                    md_content: String::new(),
                    html_content: String::new(),
                    category_id: None,
                    author_id: None,
                    is_published: true,
                    views_count: 0,
                    created_at: now,
                    updated_at: now,
                },
                &[],
            )
            .await
            .unwrap();

        (CommentRepositoryImpl::new(pool), post.id, user.id)
    }

    fn new_comment(post_id: i64, author_id: i64, parent_id: Option<i64>, published: bool) -> NewComment {
        NewComment {
            post_id,
            author_id: Some(author_id),
            parent_id,
            text: "Хорошая статья".into(),
            is_published: published,
        }
    }

    #[tokio::test]
    async fn test_list_by_post_with_meta() {
        let (repo, post_id, user_id) = setup().await;
        let root = repo.create(&new_comment(post_id, user_id, None, true)).await.unwrap();
        repo.create(&new_comment(post_id, user_id, Some(root.id), true)).await.unwrap();
        repo.create(&new_comment(post_id, user_id, None, false)).await.unwrap();

        let published = repo.list_by_post(post_id, true).await.unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].author_name.as_deref(), Some("reader"));
        assert_eq!(published[1].comment.parent_id, Some(root.id));

        assert_eq!(repo.list_by_post(post_id, false).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_set_published() {
        let (repo, post_id, user_id) = setup().await;
        let comment = repo.create(&new_comment(post_id, user_id, None, false)).await.unwrap();
        assert!(!comment.is_published);

        assert!(repo.set_published(comment.id, true).await.unwrap());
        assert!(repo.get_by_id(comment.id).await.unwrap().unwrap().is_published);
        assert!(!repo.set_published(404, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_like() {
        let (repo, post_id, user_id) = setup().await;

        assert!(repo.toggle_like(LikeTargetType::Post, post_id, user_id).await.unwrap());
        assert_eq!(repo.like_count(LikeTargetType::Post, post_id).await.unwrap(), 1);
        assert_eq!(repo.like_count(LikeTargetType::Comment, post_id).await.unwrap(), 0);

        assert!(!repo.toggle_like(LikeTargetType::Post, post_id, user_id).await.unwrap());
        assert_eq!(repo.like_count(LikeTargetType::Post, post_id).await.unwrap(), 0);
    }
}
