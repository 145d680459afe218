//! Blog post repository
//!
//! Posts and their tag links (`post_tags`). Slugs and rendered HTML are
//! prepared by the blog service before anything reaches this layer.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, PagedResult, Post};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Narrowing for published post listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostFilter {
    #[default]
    All,
    Category(i64),
    Tag(i64),
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert `post` and link `tag_ids`
    async fn create(&self, post: &Post, tag_ids: &[i64]) -> Result<Post>;

    /// Update `post` and replace its tag links
    async fn update(&self, post: &Post, tag_ids: &[i64]) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Published posts, newest first
    async fn list_published(&self, filter: PostFilter, params: &ListParams) -> Result<PagedResult<Post>>;

    /// Every published post, newest first (sitemap)
    async fn list_all_published(&self) -> Result<Vec<Post>>;

    /// Atomically bump `views_count`, returning the new value
    async fn increment_view(&self, id: i64) -> Result<Option<i64>>;

    /// Whether `slug` is taken by a post other than `exclude_id`
    async fn slug_taken(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.cover, p.md_content, p.html_content, \
     p.category_id, p.author_id, p.is_published, p.views_count, p.created_at, p.updated_at";

const INSERT_POST: &str = r#"
    INSERT INTO posts (title, slug, cover, md_content, html_content, category_id, author_id,
                       is_published, views_count, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE posts
    SET title = ?, slug = ?, cover = ?, md_content = ?, html_content = ?, category_id = ?,
        is_published = ?, updated_at = ?
    WHERE id = ?
"#;

const INSERT_POST_TAG: &str = "INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)";
const DELETE_POST_TAGS: &str = "DELETE FROM post_tags WHERE post_id = ?";

/// FROM/WHERE fragment and its bind for a filter
fn filter_sql(filter: PostFilter) -> (&'static str, Option<i64>) {
    match filter {
        PostFilter::All => ("FROM posts p WHERE p.is_published = ?", None),
        PostFilter::Category(id) => (
            "FROM posts p WHERE p.is_published = ? AND p.category_id = ?",
            Some(id),
        ),
        PostFilter::Tag(id) => (
            "FROM posts p INNER JOIN post_tags pt ON pt.post_id = p.id \
             WHERE p.is_published = ? AND pt.tag_id = ?",
            Some(id),
        ),
    }
}

fn distinct(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post, tag_ids: &[i64]) -> Result<Post> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_post_sqlite(pool, post, tag_ids).await?,
            Backend::Mysql(pool) => create_post_mysql(pool, post, tag_ids).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Post {} vanished after insert", id))
    }

    async fn update(&self, post: &Post, tag_ids: &[i64]) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_post_sqlite(pool, post, tag_ids).await?,
            Backend::Mysql(pool) => update_post_mysql(pool, post, tag_ids).await?,
        }
        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow!("Post not found: {}", post.id))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM posts WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql).bind(id).execute(pool).await?.rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql).bind(id).execute(pool).await?.rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
        let post = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get post")?
                .as_ref()
                .map(row_to_post_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get post")?
                .as_ref()
                .map(row_to_post_mysql),
        };
        Ok(post)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.slug = ?", POST_COLUMNS);
        let post = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get post by slug")?
                .as_ref()
                .map(row_to_post_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get post by slug")?
                .as_ref()
                .map(row_to_post_mysql),
        };
        Ok(post)
    }

    async fn list_published(&self, filter: PostFilter, params: &ListParams) -> Result<PagedResult<Post>> {
        let (from_where, filter_bind) = filter_sql(filter);
        let count_sql = format!("SELECT COUNT(*) AS count {}", from_where);
        let list_sql = format!(
            "SELECT {} {} ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS, from_where
        );

        let (items, total) = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut count_query = sqlx::query(&count_sql).bind(true);
                let mut list_query = sqlx::query(&list_sql).bind(true);
                if let Some(id) = filter_bind {
                    count_query = count_query.bind(id);
                    list_query = list_query.bind(id);
                }
                let total: i64 = count_query.fetch_one(pool).await?.get("count");
                let rows = list_query
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list posts")?;
                (rows.iter().map(row_to_post_sqlite).collect(), total)
            }
            Backend::Mysql(pool) => {
                let mut count_query = sqlx::query(&count_sql).bind(true);
                let mut list_query = sqlx::query(&list_sql).bind(true);
                if let Some(id) = filter_bind {
                    count_query = count_query.bind(id);
                    list_query = list_query.bind(id);
                }
                let total: i64 = count_query.fetch_one(pool).await?.get("count");
                let rows = list_query
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list posts")?;
                (rows.iter().map(row_to_post_mysql).collect(), total)
            }
        };

        Ok(PagedResult::new(items, total, params))
    }

    async fn list_all_published(&self) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts p WHERE p.is_published = ? ORDER BY p.created_at DESC, p.id DESC",
            POST_COLUMNS
        );
        let posts = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(true)
                .fetch_all(pool)
                .await?
                .iter()
                .map(row_to_post_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(true)
                .fetch_all(pool)
                .await?
                .iter()
                .map(row_to_post_mysql)
                .collect(),
        };
        Ok(posts)
    }

    async fn increment_view(&self, id: i64) -> Result<Option<i64>> {
        let update = "UPDATE posts SET views_count = views_count + 1 WHERE id = ?";
        let select = "SELECT views_count FROM posts WHERE id = ?";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(update).bind(id).execute(pool).await?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| row.get("views_count"))
            }
            Backend::Mysql(pool) => {
                sqlx::query(update).bind(id).execute(pool).await?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| row.get("views_count"))
            }
        };
        Ok(count)
    }

    async fn slug_taken(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id <> ?";
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude)
                .fetch_one(pool)
                .await?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude)
                .fetch_one(pool)
                .await?
                .get("count"),
        };
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post, tag_ids: &[i64]) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_POST)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.cover)
        .bind(&post.md_content)
        .bind(&post.html_content)
        .bind(post.category_id)
        .bind(post.author_id)
        .bind(post.is_published)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create post")?
        .last_insert_rowid();

    for tag_id in distinct(tag_ids) {
        sqlx::query(INSERT_POST_TAG)
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(UPDATE_POST)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.cover)
        .bind(&post.md_content)
        .bind(&post.html_content)
        .bind(post.category_id)
        .bind(post.is_published)
        .bind(Utc::now())
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update post")?;

    sqlx::query(DELETE_POST_TAGS)
        .bind(post.id)
        .execute(&mut *tx)
        .await?;
    for tag_id in distinct(tag_ids) {
        sqlx::query(INSERT_POST_TAG)
            .bind(post.id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await?;
    Ok(())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        cover: row.get("cover"),
        md_content: row.get("md_content"),
        html_content: row.get("html_content"),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        is_published: row.get("is_published"),
        views_count: row.get("views_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post, tag_ids: &[i64]) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_POST)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.cover)
        .bind(&post.md_content)
        .bind(&post.html_content)
        .bind(post.category_id)
        .bind(post.author_id)
        .bind(post.is_published)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create post")?
        .last_insert_id() as i64;

    for tag_id in distinct(tag_ids) {
        sqlx::query(INSERT_POST_TAG)
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_post_mysql(pool: &MySqlPool, post: &Post, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(UPDATE_POST)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.cover)
        .bind(&post.md_content)
        .bind(&post.html_content)
        .bind(post.category_id)
        .bind(post.is_published)
        .bind(Utc::now())
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update post")?;

    sqlx::query(DELETE_POST_TAGS)
        .bind(post.id)
        .execute(&mut *tx)
        .await?;
    for tag_id in distinct(tag_ids) {
        sqlx::query(INSERT_POST_TAG)
            .bind(post.id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await?;
    Ok(())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        cover: row.get("cover"),
        md_content: row.get("md_content"),
        html_content: row.get("html_content"),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        is_published: row.get("is_published"),
        views_count: row.get("views_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
