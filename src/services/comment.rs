//! Blog comments and comment likes
//!
//! Comments nest one level deep: a reply must point at a top-level comment
//! of the same post. Client comments pass through the moderation gate;
//! staff comments are published directly.

use anyhow::Context;
use std::sync::Arc;

use crate::db::repositories::{CommentRepository, NewComment};
use crate::models::{Comment, CommentWithMeta, LikeTargetType, Post, User};
use crate::services::form::{FieldErrors, NON_FIELD};
use crate::services::moderation::{ContentModerator, ModerationVerdict};

const TEXT_MAX_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("Comment not found: {0}")]
    NotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Stored comment with the moderation outcome
#[derive(Debug, Clone)]
pub struct PostedComment {
    pub comment: Comment,
    /// `None` when moderation was not needed
    pub verdict: Option<ModerationVerdict>,
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    moderator: Arc<dyn ContentModerator>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, moderator: Arc<dyn ContentModerator>) -> Self {
        Self { repo, moderator }
    }

    /// Published comments of a post grouped into threads; staff see all
    pub async fn threads(&self, post_id: i64, viewer: Option<&User>) -> Result<Vec<CommentWithMeta>, CommentError> {
        let published_only = !viewer.is_some_and(User::is_staff);
        let comments = self.repo.list_by_post(post_id, published_only).await?;
        Ok(CommentWithMeta::build_threads(comments))
    }

    pub async fn add(&self, post: &Post, author: &User, text: &str, parent_id: Option<i64>) -> Result<PostedComment, CommentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommentError::Validation(FieldErrors::single("text", "Комментарий не может быть пустым")));
        }
        if text.chars().count() > TEXT_MAX_CHARS {
            return Err(CommentError::Validation(FieldErrors::single(
                "text",
                "Комментарий не должен превышать 2000 символов",
            )));
        }

        if let Some(parent_id) = parent_id {
            let parent = self
                .repo
                .get_by_id(parent_id)
                .await?
                .filter(|parent| parent.post_id == post.id)
                .ok_or_else(|| {
                    CommentError::Validation(FieldErrors::single(NON_FIELD, "Комментарий для ответа не найден"))
                })?;
            if parent.parent_id.is_some() {
                return Err(CommentError::Validation(FieldErrors::single(
                    NON_FIELD,
                    "Допускается только один уровень вложенности комментариев",
                )));
            }
        }

        let verdict = if author.is_staff() {
            None
        } else {
            Some(self.moderator.moderate(text).await)
        };
        let is_published = verdict.map_or(true, |v| v.publishable());

        let comment = self
            .repo
            .create(&NewComment {
                post_id: post.id,
                author_id: Some(author.id),
                parent_id,
                text: text.to_string(),
                is_published,
            })
            .await
            .context("Failed to create comment")?;

        tracing::info!(
            comment_id = comment.id,
            post_id = post.id,
            reply = parent_id.is_some(),
            published = is_published,
            "Comment added"
        );
        Ok(PostedComment { comment, verdict })
    }

    /// Toggle the user's like on a comment; returns (liked, like count)
    pub async fn toggle_like(&self, comment_id: i64, user: &User) -> Result<(bool, i64), CommentError> {
        let comment = self
            .repo
            .get_by_id(comment_id)
            .await?
            .ok_or(CommentError::NotFound(comment_id))?;
        if !comment.is_published && !user.is_staff() {
            return Err(CommentError::NotFound(comment_id));
        }

        let liked = self
            .repo
            .toggle_like(LikeTargetType::Comment, comment_id, user.id)
            .await?;
        let count = self.repo.like_count(LikeTargetType::Comment, comment_id).await?;
        Ok((liked, count))
    }

    pub async fn get(&self, id: i64) -> Result<Comment, CommentError> {
        self.repo.get_by_id(id).await?.ok_or(CommentError::NotFound(id))
    }

    pub async fn set_published(&self, id: i64, is_published: bool) -> Result<(), CommentError> {
        if !self.repo.set_published(id, is_published).await? {
            return Err(CommentError::NotFound(id));
        }
        tracing::info!(comment_id = id, is_published, "Comment publication changed by staff");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CommentRepositoryImpl, PostRepository, SqlxPostRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FixedModerator(ModerationVerdict);

    #[async_trait]
    impl ContentModerator for FixedModerator {
        async fn moderate(&self, _text: &str) -> ModerationVerdict {
            self.0
        }
    }

    struct Fixture {
        comments: CommentService,
        post: Post,
        other_post: Post,
        client: User,
        staff: User,
    }

    async fn setup(verdict: ModerationVerdict) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let client = users
            .create(&User::new("client".into(), "client@example.com".into(), "h".into(), UserRole::Client))
            .await
            .unwrap();
        let staff = users
            .create(&User::new("staff".into(), "staff@example.com".into(), "h".into(), UserRole::Staff))
            .await
            .unwrap();

        let posts = SqlxPostRepository::new(pool.clone());
        let mut created = Vec::new();
        for slug in ["first", "second"] {
            let now = Utc::now();
            let post = posts
                .create(
                    &Post {
                        id: 0,
                        title: slug.to_string(),
                        slug: slug.to_string(),
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
            created.push(post);
        }
        let other_post = created.remove(1);
        let post = created.remove(0);

        Fixture {
            comments: CommentService::new(
                CommentRepositoryImpl::boxed(pool.clone()),
                Arc::new(FixedModerator(verdict)),
            ),
            post,
            other_post,
            client,
            staff,
        }
    }

    #[tokio::test]
    async fn test_reply_depth_is_limited() {
        let fx = setup(ModerationVerdict::Approved).await;
        let root = fx.comments.add(&fx.post, &fx.client, "Корень", None).await.unwrap().comment;
        let reply = fx
            .comments
            .add(&fx.post, &fx.client, "Ответ", Some(root.id))
            .await
            .unwrap()
            .comment;
        assert_eq!(reply.parent_id, Some(root.id));

        match fx.comments.add(&fx.post, &fx.client, "Ответ на ответ", Some(reply.id)).await {
            Err(CommentError::Validation(errors)) => assert_eq!(
                errors.get(NON_FIELD),
                ["Допускается только один уровень вложенности комментариев"]
            ),
            other => panic!("expected validation error, got {:?}", other.map(|c| c.comment.id)),
        }

        // Parent must belong to the same post
        assert!(matches!(
            fx.comments.add(&fx.other_post, &fx.client, "Чужой", Some(root.id)).await,
            Err(CommentError::Validation(_))
        ));

        let threads = fx.comments.threads(fx.post.id, None).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies.len(), 1);
    }

    #[tokio::test]
    async fn test_moderation_controls_publication() {
        let fx = setup(ModerationVerdict::Flagged).await;

        let flagged = fx.comments.add(&fx.post, &fx.client, "Спам", None).await.unwrap();
        assert!(!flagged.comment.is_published);
        assert_eq!(flagged.verdict, Some(ModerationVerdict::Flagged));

        let by_staff = fx.comments.add(&fx.post, &fx.staff, "Ответ барбершопа", None).await.unwrap();
        assert!(by_staff.comment.is_published);
        assert_eq!(by_staff.verdict, None);

        assert_eq!(fx.comments.threads(fx.post.id, None).await.unwrap().len(), 1);
        assert_eq!(fx.comments.threads(fx.post.id, Some(&fx.staff)).await.unwrap().len(), 2);

        fx.comments.set_published(flagged.comment.id, true).await.unwrap();
        assert_eq!(fx.comments.threads(fx.post.id, Some(&fx.client)).await.unwrap().len(), 2);
        assert!(matches!(fx.comments.set_published(999, true).await, Err(CommentError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_empty_text_and_likes() {
        let fx = setup(ModerationVerdict::Approved).await;
        assert!(matches!(
            fx.comments.add(&fx.post, &fx.client, "   ", None).await,
            Err(CommentError::Validation(_))
        ));

        let comment = fx.comments.add(&fx.post, &fx.client, "Классно", None).await.unwrap().comment;
        assert_eq!(fx.comments.toggle_like(comment.id, &fx.staff).await.unwrap(), (true, 1));
        assert_eq!(fx.comments.toggle_like(comment.id, &fx.client).await.unwrap(), (true, 2));
        assert_eq!(fx.comments.toggle_like(comment.id, &fx.staff).await.unwrap(), (false, 1));
        assert!(matches!(fx.comments.toggle_like(404, &fx.client).await, Err(CommentError::NotFound(404))));
    }
}
