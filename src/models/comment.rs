//! Comment and like models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment on a blog post. Replies point at a top-level comment through
/// `parent_id`; replies to replies are rejected by the comment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub text: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Id of the top-level comment a reply form should attach to
    pub fn first_parent_id(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }
}

/// Comment with author name and like count
#[derive(Debug, Clone, Serialize)]
pub struct CommentWithMeta {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: Option<String>,
    pub like_count: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentWithMeta>,
}

impl CommentWithMeta {
    /// Group a flat, oldest-first list into top-level comments with their replies.
    /// Replies whose parent is not in the list are dropped.
    pub fn build_threads(comments: Vec<CommentWithMeta>) -> Vec<CommentWithMeta> {
        let (mut roots, replies): (Vec<_>, Vec<_>) = comments
            .into_iter()
            .partition(|c| c.comment.parent_id.is_none());

        for reply in replies {
            if let Some(parent) = roots
                .iter_mut()
                .find(|root| Some(root.comment.id) == reply.comment.parent_id)
            {
                parent.replies.push(reply);
            }
        }

        roots
    }
}

/// What a like points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTargetType {
    Post,
    Comment,
}

impl std::fmt::Display for LikeTargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Post => write!(f, "post"),
            Self::Comment => write!(f, "comment"),
        }
    }
}
