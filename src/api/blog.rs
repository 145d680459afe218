//! Blog pages, comments and likes

use axum::{
    extract::{rejection::FormRejection, Path, Query, State},
    http::HeaderMap,
    middleware::from_fn,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;
use tera::Context as TeraContext;

use super::common::{is_ajax, safe_next, PageQuery};
use super::middleware::{require_login_page, AppState, AuthenticatedUser};
use super::page::{Page, PageError};
use crate::models::PagedResult;
use crate::services::{CommentError, FlashLevel, PostCard, NON_FIELD};

pub fn router() -> Router<AppState> {
    let members = Router::new()
        .route("/blog/{slug}/comments/", post(add_comment))
        .route("/blog/{slug}/like/", post(like_post))
        .route("/blog/comments/{id}/like/", post(like_comment))
        .route_layer(from_fn(require_login_page));

    Router::new()
        .route("/blog/", get(post_list))
        .route("/blog/category/{slug}/", get(category_posts))
        .route("/blog/tag/{slug}/", get(tag_posts))
        .route("/blog/{slug}/", get(post_detail))
        .merge(members)
}

async fn render_listing(
    state: &AppState,
    page: &Page,
    title: &str,
    posts: &PagedResult<PostCard>,
    mut context: TeraContext,
) -> Result<Response, PageError> {
    context.insert("title", title);
    context.insert("posts", &posts.items);
    context.insert("pagination", &posts.info());
    context.insert("categories", &state.blog_service.categories().await?);
    context.insert("tags", &state.blog_service.tags().await?);
    page.render(state, "blog/post_list.html", context).await
}

/// GET /blog/
async fn post_list(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let params = query.params(state.config.pagination.posts_per_page);
    let posts = state.blog_service.list_posts(&params).await?;
    render_listing(&state, &page, "Блог", &posts, TeraContext::new()).await
}

/// GET /blog/category/{slug}/
async fn category_posts(
    State(state): State<AppState>,
    page: Page,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let params = query.params(state.config.pagination.posts_per_page);
    let listing = state.blog_service.list_by_category(&slug, &params).await?;

    let mut context = TeraContext::new();
    context.insert("category", &listing.filter);
    let title = format!("Категория: {}", listing.filter.name);
    render_listing(&state, &page, &title, &listing.posts, context).await
}

/// GET /blog/tag/{slug}/
async fn tag_posts(
    State(state): State<AppState>,
    page: Page,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let params = query.params(state.config.pagination.posts_per_page);
    let listing = state.blog_service.list_by_tag(&slug, &params).await?;

    let mut context = TeraContext::new();
    context.insert("tag", &listing.filter);
    let title = format!("Тег: {}", listing.filter.name);
    render_listing(&state, &page, &title, &listing.posts, context).await
}

/// GET /blog/{slug}/ - staff may preview drafts
async fn post_detail(State(state): State<AppState>, page: Page, Path(slug): Path<String>) -> Result<Response, PageError> {
    let detail = state
        .blog_service
        .view_post(&slug, page.user(), &page.visitor.id)
        .await?;
    let comments = state.comment_service.threads(detail.post.id, page.user()).await?;

    let mut context = TeraContext::new();
    context.insert("title", &detail.post.title);
    context.insert("post", &detail);
    context.insert("comments", &comments);
    page.render(&state, "blog/post_detail.html", context).await
}

#[derive(Debug, Deserialize)]
struct CommentForm {
    #[serde(default)]
    text: String,
    #[serde(default)]
    parent_id: Option<String>,
}

/// POST /blog/{slug}/comments/
async fn add_comment(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(slug): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let post = state.blog_service.get_visible_post(&slug, Some(&user)).await?;
    let back = format!("/blog/{}/#comments", post.slug);
    let parent_id = form
        .parent_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok());

    match state.comment_service.add(&post, &user, &form.text, parent_id).await {
        Ok(posted) if posted.comment.is_published => {
            Ok(page.redirect_with(&state, &back, FlashLevel::Success, "Комментарий добавлен.").await)
        }
        Ok(_) => Ok(page
            .redirect_with(
                &state,
                &back,
                FlashLevel::Info,
                "Комментарий отправлен и будет опубликован после проверки модератором.",
            )
            .await),
        Err(CommentError::Validation(errors)) => {
            let message = errors
                .get("text")
                .iter()
                .chain(errors.get(NON_FIELD))
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            Ok(page.redirect_with(&state, &back, FlashLevel::Error, message).await)
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /blog/{slug}/like/
async fn like_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Response, PageError> {
    let (liked, like_count) = state.blog_service.toggle_post_like(&slug, &user).await?;
    if is_ajax(&headers) {
        return Ok(Json(json!({ "liked": liked, "like_count": like_count })).into_response());
    }
    Ok(Redirect::to(&format!("/blog/{}/", slug)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct NextForm {
    next: Option<String>,
}

/// POST /blog/comments/{id}/like/
async fn like_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    form: Result<Form<NextForm>, FormRejection>,
) -> Result<Response, PageError> {
    let (liked, like_count) = state.comment_service.toggle_like(id, &user).await?;
    if is_ajax(&headers) {
        return Ok(Json(json!({ "liked": liked, "like_count": like_count })).into_response());
    }
    let form = form.map(|Form(form)| form).unwrap_or_default();
    let back = safe_next(form.next.as_deref()).unwrap_or_else(|| "/blog/".to_string());
    Ok(Redirect::to(&back).into_response())
}
