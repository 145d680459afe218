//! Blog: posts, categories and tags
//!
//! Post bodies are Markdown rendered to HTML on every save. Slugs are
//! generated from the title (or name) when left empty and made unique with
//! a numeric suffix; an explicitly chosen slug that is taken is an error.

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::repositories::{
    CategoryRepository, CommentRepository, PostFilter, PostRepository, TagRepository, UserRepository,
};
use crate::models::{
    Category, CategoryInput, LikeTargetType, ListParams, PagedResult, Post, PostDetail, PostInput, Tag,
    TagInput, User,
};
use crate::services::form::{non_blank, FieldErrors};
use crate::services::markdown::{excerpt, MarkdownRenderer};
use crate::services::slug::slugify_or;
use crate::services::visitor::{ViewedKind, VisitorStore};

const TITLE_MAX_CHARS: usize = 200;
const CATEGORY_NAME_MAX_CHARS: usize = 200;
const TAG_NAME_MAX_CHARS: usize = 100;
const EXCERPT_CHARS: usize = 300;
/// Give up on suffixing after this many collisions
const MAX_SLUG_ATTEMPTS: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Post as shown in listings
#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    #[serde(flatten)]
    pub post: Post,
    pub category: Option<Category>,
    pub excerpt: String,
}

/// A filtered listing together with what it was filtered by
#[derive(Debug, Clone, Serialize)]
pub struct PostListing<F> {
    pub filter: F,
    pub posts: PagedResult<PostCard>,
}

pub struct BlogService {
    post_repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    tag_repo: Arc<dyn TagRepository>,
    comment_repo: Arc<dyn CommentRepository>,
    user_repo: Arc<dyn UserRepository>,
    renderer: MarkdownRenderer,
    visitors: VisitorStore,
}

impl BlogService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        tag_repo: Arc<dyn TagRepository>,
        comment_repo: Arc<dyn CommentRepository>,
        user_repo: Arc<dyn UserRepository>,
        renderer: MarkdownRenderer,
        visitors: VisitorStore,
    ) -> Self {
        Self {
            post_repo,
            category_repo,
            tag_repo,
            comment_repo,
            user_repo,
            renderer,
            visitors,
        }
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    async fn cards(&self, page: PagedResult<Post>) -> Result<PagedResult<PostCard>, BlogError> {
        let categories: HashMap<i64, Category> = self
            .category_repo
            .list()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let items = page
            .items
            .into_iter()
            .map(|post| PostCard {
                category: post.category_id.and_then(|id| categories.get(&id).cloned()),
                excerpt: excerpt(&post.md_content, EXCERPT_CHARS),
                post,
            })
            .collect();

        Ok(PagedResult {
            items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Published posts, newest first
    pub async fn list_posts(&self, params: &ListParams) -> Result<PagedResult<PostCard>, BlogError> {
        let page = self.post_repo.list_published(PostFilter::All, params).await?;
        self.cards(page).await
    }

    pub async fn list_by_category(&self, slug: &str, params: &ListParams) -> Result<PostListing<Category>, BlogError> {
        let category = self
            .category_repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("category {}", slug)))?;
        let page = self
            .post_repo
            .list_published(PostFilter::Category(category.id), params)
            .await?;
        Ok(PostListing {
            filter: category,
            posts: self.cards(page).await?,
        })
    }

    pub async fn list_by_tag(&self, slug: &str, params: &ListParams) -> Result<PostListing<Tag>, BlogError> {
        let tag = self
            .tag_repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("tag {}", slug)))?;
        let page = self.post_repo.list_published(PostFilter::Tag(tag.id), params).await?;
        Ok(PostListing {
            filter: tag,
            posts: self.cards(page).await?,
        })
    }

    pub async fn categories(&self) -> Result<Vec<Category>, BlogError> {
        Ok(self.category_repo.list().await?)
    }

    pub async fn tags(&self) -> Result<Vec<Tag>, BlogError> {
        Ok(self.tag_repo.list().await?)
    }

    /// Published post by slug; staff may also see drafts
    pub async fn get_visible_post(&self, slug: &str, viewer: Option<&User>) -> Result<Post, BlogError> {
        let post = self
            .post_repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("post {}", slug)))?;

        let can_preview = viewer.is_some_and(User::is_staff);
        if !post.is_published && !can_preview {
            return Err(BlogError::NotFound(format!("post {}", slug)));
        }
        Ok(post)
    }

    /// Post page data. Views of published posts are counted once per visitor.
    pub async fn view_post(&self, slug: &str, viewer: Option<&User>, visitor_id: &str) -> Result<PostDetail, BlogError> {
        let mut post = self.get_visible_post(slug, viewer).await?;

        if post.is_published {
            match self.visitors.mark_viewed(visitor_id, ViewedKind::Post, post.id).await {
                Ok(true) => {
                    if let Some(count) = self.post_repo.increment_view(post.id).await? {
                        post.views_count = count;
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(post_id = post.id, error = %e, "Failed to read visitor state, not counting view"),
            }
        }

        self.detail(post).await
    }

    async fn detail(&self, post: Post) -> Result<PostDetail, BlogError> {
        let category = match post.category_id {
            Some(id) => self.category_repo.get_by_id(id).await?,
            None => None,
        };
        let tags = self.tag_repo.get_by_post(post.id).await?;
        let author_name = match post.author_id {
            Some(id) => self.user_repo.get_by_id(id).await?.map(|u| u.username),
            None => None,
        };
        let like_count = self.comment_repo.like_count(LikeTargetType::Post, post.id).await?;

        Ok(PostDetail {
            post,
            category,
            tags,
            author_name,
            like_count,
        })
    }

    /// Toggle the user's like on a published post; returns (liked, like count)
    pub async fn toggle_post_like(&self, slug: &str, user: &User) -> Result<(bool, i64), BlogError> {
        let post = self.get_visible_post(slug, Some(user)).await?;
        let liked = self
            .comment_repo
            .toggle_like(LikeTargetType::Post, post.id, user.id)
            .await?;
        let count = self.comment_repo.like_count(LikeTargetType::Post, post.id).await?;
        Ok((liked, count))
    }

    /// Every published post, for the sitemap
    pub async fn sitemap_posts(&self) -> Result<Vec<Post>, BlogError> {
        Ok(self.post_repo.list_all_published().await?)
    }

    // ------------------------------------------------------------------
    // Staff writes
    // ------------------------------------------------------------------

    /// First free slug among `base`, `base-2`, `base-3`, ...
    async fn unique_post_slug(&self, base: &str, exclude_id: Option<i64>) -> Result<String, BlogError> {
        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            let candidate = if attempt == 1 {
                base.to_string()
            } else {
                format!("{}-{}", base, attempt)
            };
            if !self.post_repo.slug_taken(&candidate, exclude_id).await? {
                return Ok(candidate);
            }
        }
        Err(BlogError::Validation(FieldErrors::single("slug", "Не удалось подобрать свободный слаг")))
    }

    /// Check post fields and resolve the slug
    async fn prepare_post(&self, input: &PostInput, exclude_id: Option<i64>) -> Result<(String, String), BlogError> {
        let mut errors = FieldErrors::new();

        let title = input.title.trim().to_string();
        if title.is_empty() {
            errors.add("title", "Укажите заголовок");
        } else if title.chars().count() > TITLE_MAX_CHARS {
            errors.add("title", "Заголовок не должен превышать 200 символов");
        }

        if let Some(category_id) = input.category_id {
            if self.category_repo.get_by_id(category_id).await?.is_none() {
                errors.add("category_id", "Категория не найдена");
            }
        }

        let mut tag_ids = input.tag_ids.clone();
        tag_ids.sort_unstable();
        tag_ids.dedup();
        if !tag_ids.is_empty() && self.tag_repo.get_many(&tag_ids).await?.len() != tag_ids.len() {
            errors.add("tag_ids", "Выбраны несуществующие теги");
        }

        let slug = match non_blank(input.slug.as_deref()) {
            Some(requested) => {
                let slug = slugify_or(&requested, "");
                if slug.is_empty() {
                    errors.add("slug", "Некорректный слаг");
                } else if self.post_repo.slug_taken(&slug, exclude_id).await? {
                    errors.add("slug", "Пост с таким слагом уже существует");
                }
                slug
            }
            None if errors.is_empty() => self.unique_post_slug(&slugify_or(&title, "post"), exclude_id).await?,
            None => String::new(),
        };

        errors.into_result((title, slug)).map_err(BlogError::Validation)
    }

    pub async fn create_post(&self, input: &PostInput, author_id: Option<i64>) -> Result<Post, BlogError> {
        let (title, slug) = self.prepare_post(input, None).await?;
        let now = Utc::now();
        let post = Post {
            id: 0,
            title,
            slug,
            cover: non_blank(input.cover.as_deref()),
            html_content: self.renderer.render(&input.md_content),
            md_content: input.md_content.clone(),
            category_id: input.category_id,
            author_id,
            is_published: input.is_published,
            views_count: 0,
            created_at: now,
            updated_at: now,
        };

        let post = self
            .post_repo
            .create(&post, &input.tag_ids)
            .await
            .context("Failed to create post")?;
        tracing::info!(post_id = post.id, slug = %post.slug, "Post created");
        Ok(post)
    }

    pub async fn update_post(&self, id: i64, input: &PostInput) -> Result<Post, BlogError> {
        let existing = self
            .post_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("post {}", id)))?;

        // Keep the current slug unless a new one is given
        let mut input = input.clone();
        if non_blank(input.slug.as_deref()).is_none() {
            input.slug = Some(existing.slug.clone());
        }
        let (title, slug) = self.prepare_post(&input, Some(id)).await?;

        let post = Post {
            title,
            slug,
            cover: non_blank(input.cover.as_deref()).or(existing.cover.clone()),
            html_content: self.renderer.render(&input.md_content),
            md_content: input.md_content.clone(),
            category_id: input.category_id,
            is_published: input.is_published,
            ..existing
        };

        let post = self
            .post_repo
            .update(&post, &input.tag_ids)
            .await
            .context("Failed to update post")?;
        tracing::info!(post_id = id, "Post updated");
        Ok(post)
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), BlogError> {
        if !self.post_repo.delete(id).await? {
            return Err(BlogError::NotFound(format!("post {}", id)));
        }
        tracing::info!(post_id = id, "Post deleted");
        Ok(())
    }

    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category, BlogError> {
        let name = input.name.trim();
        if name.is_empty() || name.chars().count() > CATEGORY_NAME_MAX_CHARS {
            return Err(BlogError::Validation(FieldErrors::single(
                "name",
                "Название категории обязательно и не длиннее 200 символов",
            )));
        }

        let base = slugify_or(input.slug.as_deref().unwrap_or(name), "category");
        let mut slug = base.clone();
        let mut attempt = 1;
        while self.category_repo.slug_exists(&slug).await? {
            attempt += 1;
            if attempt > MAX_SLUG_ATTEMPTS {
                return Err(BlogError::Validation(FieldErrors::single("slug", "Не удалось подобрать свободный слаг")));
            }
            slug = format!("{}-{}", base, attempt);
        }

        let category = self
            .category_repo
            .create(&Category {
                id: 0,
                name: name.to_string(),
                slug,
                description: non_blank(input.description.as_deref()),
                cover: non_blank(input.cover.as_deref()),
            })
            .await
            .context("Failed to create category")?;
        tracing::info!(category_id = category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    pub async fn create_tag(&self, input: &TagInput) -> Result<Tag, BlogError> {
        let name = input.name.trim();
        if name.is_empty() || name.chars().count() > TAG_NAME_MAX_CHARS {
            return Err(BlogError::Validation(FieldErrors::single(
                "name",
                "Название тега обязательно и не длиннее 100 символов",
            )));
        }

        let base = slugify_or(input.slug.as_deref().unwrap_or(name), "tag");
        let mut slug = base.clone();
        let mut attempt = 1;
        while self.tag_repo.slug_exists(&slug).await? {
            attempt += 1;
            if attempt > MAX_SLUG_ATTEMPTS {
                return Err(BlogError::Validation(FieldErrors::single("slug", "Не удалось подобрать свободный слаг")));
            }
            slug = format!("{}-{}", base, attempt);
        }

        let tag = self
            .tag_repo
            .create(&Tag {
                id: 0,
                name: name.to_string(),
                slug,
            })
            .await
            .context("Failed to create tag")?;
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::SessionConfig;
    use crate::db::repositories::{
        CommentRepositoryImpl, SqlxCategoryRepository, SqlxPostRepository, SqlxTagRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;

    struct Fixture {
        blog: BlogService,
        users: Arc<dyn UserRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let blog = BlogService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            CommentRepositoryImpl::boxed(pool.clone()),
            users.clone(),
            MarkdownRenderer::new(),
            VisitorStore::new(Arc::new(MemoryCache::new()), &SessionConfig::default()),
        );
        Fixture { blog, users }
    }

    fn post_input(title: &str, published: bool) -> PostInput {
        PostInput {
            title: title.to_string(),
            slug: None,
            cover: None,
            md_content: "# Заголовок\n\nТекст **поста**.".to_string(),
            category_id: None,
            tag_ids: vec![],
            is_published: published,
        }
    }

    async fn user(fx: &Fixture, name: &str, role: UserRole) -> User {
        fx.users
            .create(&User::new(name.to_string(), format!("{}@example.com", name), "hash".to_string(), role))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_post_generates_unique_slugs() {
        let fx = setup().await;

        let first = fx.blog.create_post(&post_input("Уход за бородой", true), None).await.unwrap();
        let second = fx.blog.create_post(&post_input("Уход за бородой", true), None).await.unwrap();
        assert_eq!(first.slug, "ukhod-za-borodoi");
        assert_eq!(second.slug, "ukhod-za-borodoi-2");
        assert!(first.html_content.contains("<strong>поста</strong>"));

        let mut explicit = post_input("Другое", true);
        explicit.slug = Some("ukhod-za-borodoi".to_string());
        match fx.blog.create_post(&explicit, None).await {
            Err(BlogError::Validation(errors)) => assert!(errors.has("slug")),
            other => panic!("expected validation error, got {:?}", other.map(|p| p.id)),
        }
    }

    #[tokio::test]
    async fn test_validation() {
        let fx = setup().await;
        let mut input = post_input("  ", true);
        input.category_id = Some(77);
        input.tag_ids = vec![5];
        match fx.blog.create_post(&input, None).await {
            Err(BlogError::Validation(errors)) => {
                assert!(errors.has("title"));
                assert!(errors.has("category_id"));
                assert!(errors.has("tag_ids"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|p| p.id)),
        }
    }

    #[tokio::test]
    async fn test_update_rerenders_and_keeps_slug() {
        let fx = setup().await;
        let post = fx.blog.create_post(&post_input("Стрижки", false), None).await.unwrap();

        let mut input = post_input("Стрижки 2030", true);
        input.md_content = "*новый* текст".to_string();
        let updated = fx.blog.update_post(post.id, &input).await.unwrap();

        assert_eq!(updated.slug, post.slug);
        assert_eq!(updated.title, "Стрижки 2030");
        assert!(updated.html_content.contains("<em>новый</em>"));
        assert!(updated.is_published);

        assert!(matches!(fx.blog.update_post(999, &input).await, Err(BlogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_drafts_visible_to_staff_only() {
        let fx = setup().await;
        let draft = fx.blog.create_post(&post_input("Черновик", false), None).await.unwrap();
        let client = user(&fx, "client", UserRole::Client).await;
        let staff = user(&fx, "staff", UserRole::Staff).await;

        assert!(matches!(fx.blog.view_post(&draft.slug, None, "v").await, Err(BlogError::NotFound(_))));
        assert!(fx.blog.view_post(&draft.slug, Some(&client), "v").await.is_err());

        let detail = fx.blog.view_post(&draft.slug, Some(&staff), "v").await.unwrap();
        // Previews are not counted
        assert_eq!(detail.post.views_count, 0);
        assert!(fx.blog.list_posts(&ListParams::new(1, 5)).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_views_and_likes() {
        let fx = setup().await;
        let author = user(&fx, "author", UserRole::Staff).await;
        let post = fx.blog.create_post(&post_input("Пост", true), Some(author.id)).await.unwrap();

        let detail = fx.blog.view_post(&post.slug, None, "a").await.unwrap();
        assert_eq!(detail.post.views_count, 1);
        assert_eq!(detail.author_name.as_deref(), Some("author"));
        assert_eq!(fx.blog.view_post(&post.slug, None, "a").await.unwrap().post.views_count, 1);
        assert_eq!(fx.blog.view_post(&post.slug, None, "b").await.unwrap().post.views_count, 2);

        assert_eq!(fx.blog.toggle_post_like(&post.slug, &author).await.unwrap(), (true, 1));
        assert_eq!(fx.blog.toggle_post_like(&post.slug, &author).await.unwrap(), (false, 0));
    }

    #[tokio::test]
    async fn test_category_and_tag_listings() {
        let fx = setup().await;
        let category = fx
            .blog
            .create_category(&CategoryInput {
                name: "Советы".to_string(),
                slug: None,
                description: None,
                cover: None,
            })
            .await
            .unwrap();
        let duplicate = fx
            .blog
            .create_category(&CategoryInput {
                name: "Советы".to_string(),
                slug: None,
                description: None,
                cover: None,
            })
            .await
            .unwrap();
        assert_eq!(category.slug, "sovety");
        assert_eq!(duplicate.slug, "sovety-2");

        let tag = fx
            .blog
            .create_tag(&TagInput {
                name: "Борода".to_string(),
                slug: None,
            })
            .await
            .unwrap();

        let mut input = post_input("С категорией", true);
        input.category_id = Some(category.id);
        input.tag_ids = vec![tag.id];
        fx.blog.create_post(&input, None).await.unwrap();
        fx.blog.create_post(&post_input("Без категории", true), None).await.unwrap();

        let params = ListParams::new(1, 5);
        let by_category = fx.blog.list_by_category("sovety", &params).await.unwrap();
        assert_eq!(by_category.posts.total, 1);
        assert_eq!(by_category.posts.items[0].category.as_ref().map(|c| c.id), Some(category.id));

        let by_tag = fx.blog.list_by_tag(&tag.slug, &params).await.unwrap();
        assert_eq!(by_tag.posts.items[0].post.title, "С категорией");

        assert_eq!(fx.blog.list_posts(&params).await.unwrap().total, 2);
        assert!(matches!(fx.blog.list_by_tag("nope", &params).await, Err(BlogError::NotFound(_))));
        assert_eq!(fx.blog.sitemap_posts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_post() {
        let fx = setup().await;
        let post = fx.blog.create_post(&post_input("Удалить", true), None).await.unwrap();
        fx.blog.delete_post(post.id).await.unwrap();
        assert!(matches!(fx.blog.delete_post(post.id).await, Err(BlogError::NotFound(_))));
    }
}
