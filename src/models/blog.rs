//! Blog models: categories, tags and posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    /// Generated from the name when empty
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Blog post. `html_content` is the rendered markdown, refreshed on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub cover: Option<String>,
    pub md_content: String,
    pub html_content: String,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub is_published: bool,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post fields accepted from staff
#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub md_content: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub is_published: bool,
}

/// Post with its category, tags, author and like count, for pages
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub author_name: Option<String>,
    pub like_count: i64,
}
