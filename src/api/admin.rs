//! Staff API endpoints
//!
//! Handles HTTP requests for back-office management, mounted under
//! `/api/v1/admin`:
//! - Order status changes
//! - Masters with ratings, create/update, bulk activation
//! - Review and comment publication
//! - Blog posts, categories and tags
//!
//! Every route requires a staff session (401 anonymous, 403 otherwise).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{require_staff, ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Category, CategoryInput, Master, MasterInput, MasterWithRating, OrderStatus, Post, PostInput, RatingBucket,
    ReviewWithMaster, Tag, TagInput,
};
use crate::services::{BlogError, CatalogError, CommentError, FieldErrors, OrderError, ReviewError};

/// Build the staff router
pub fn router() -> Router<AppState> {
    Router::new()
        // Orders
        .route("/orders/status", post(set_order_status))
        // Masters
        .route("/masters", get(list_masters).post(create_master))
        .route("/masters/{id}", put(update_master))
        .route("/masters/active", post(set_masters_active))
        // Reviews
        .route("/reviews", get(list_reviews))
        .route("/reviews/{id}/publish", post(publish_review))
        // Blog
        .route("/posts", post(create_post))
        .route("/posts/{id}", put(update_post).delete(delete_post))
        .route("/categories", post(create_category))
        .route("/tags", post(create_tag))
        .route("/comments/{id}/publish", post(publish_comment))
        .route_layer(from_fn(require_staff))
}

fn validation_error(errors: FieldErrors) -> ApiError {
    match serde_json::to_value(&errors) {
        Ok(details) => ApiError::with_details("VALIDATION_ERROR", "Validation failed", details),
        Err(_) => ApiError::validation_error(errors.to_string()),
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            CatalogError::Validation(errors) => validation_error(errors),
            CatalogError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(id) => ApiError::not_found(format!("Order {} not found", id)),
            OrderError::Validation(errors) => validation_error(errors),
            OrderError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::NotFound(id) => ApiError::not_found(format!("Review {} not found", id)),
            ReviewError::Validation(errors) => validation_error(errors),
            ReviewError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<BlogError> for ApiError {
    fn from(e: BlogError) -> Self {
        match e {
            BlogError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            BlogError::Validation(errors) => validation_error(errors),
            BlogError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<CommentError> for ApiError {
    fn from(e: CommentError) -> Self {
        match e {
            CommentError::NotFound(id) => ApiError::not_found(format!("Comment {} not found", id)),
            CommentError::Validation(errors) => validation_error(errors),
            CommentError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

/// Request for a bulk status change
#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub ids: Vec<i64>,
    pub status: OrderStatus,
}

/// Number of rows a bulk action touched
#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

/// POST /api/v1/admin/orders/status
async fn set_order_status(
    State(state): State<AppState>,
    Json(body): Json<OrderStatusRequest>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    if body.ids.is_empty() {
        return Err(ApiError::validation_error("No orders selected"));
    }
    let updated = state.order_service.set_status(&body.ids, body.status).await?;
    Ok(Json(UpdatedResponse { updated }))
}

#[derive(Debug, Deserialize)]
pub struct MasterListQuery {
    pub rating: Option<String>,
}

/// GET /api/v1/admin/masters?rating=
async fn list_masters(
    State(state): State<AppState>,
    Query(query): Query<MasterListQuery>,
) -> Result<Json<Vec<MasterWithRating>>, ApiError> {
    let bucket = match query.rating.as_deref().filter(|r| !r.is_empty()) {
        Some(raw) => Some(raw.parse::<RatingBucket>().map_err(ApiError::validation_error)?),
        None => None,
    };
    Ok(Json(state.master_service.list_with_rating(bucket).await?))
}

/// POST /api/v1/admin/masters
async fn create_master(
    State(state): State<AppState>,
    Json(body): Json<MasterInput>,
) -> Result<(StatusCode, Json<Master>), ApiError> {
    let master = state.master_service.create(&body).await?;
    Ok((StatusCode::CREATED, Json(master)))
}

/// PUT /api/v1/admin/masters/{id}
async fn update_master(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<MasterInput>,
) -> Result<Json<Master>, ApiError> {
    Ok(Json(state.master_service.update(id, &body).await?))
}

#[derive(Debug, Deserialize)]
pub struct MasterActiveRequest {
    pub ids: Vec<i64>,
    pub is_active: bool,
}

/// POST /api/v1/admin/masters/active
async fn set_masters_active(
    State(state): State<AppState>,
    Json(body): Json<MasterActiveRequest>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let updated = state.master_service.set_active(&body.ids, body.is_active).await?;
    Ok(Json(UpdatedResponse { updated }))
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub published: Option<bool>,
}

/// GET /api/v1/admin/reviews?published=
async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<Vec<ReviewWithMaster>>, ApiError> {
    Ok(Json(state.review_service.list(query.published).await?))
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub is_published: bool,
}

/// POST /api/v1/admin/reviews/{id}/publish
async fn publish_review(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PublishRequest>,
) -> Result<StatusCode, ApiError> {
    state.review_service.set_published(id, body.is_published).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/posts - the author is the staff member creating it
async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<PostInput>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state.blog_service.create_post(&body, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /api/v1/admin/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PostInput>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.blog_service.update_post(id, &body).await?))
}

/// DELETE /api/v1/admin/posts/{id}
async fn delete_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.blog_service.delete_post(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.blog_service.create_category(&body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// POST /api/v1/admin/tags
async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<TagInput>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.blog_service.create_tag(&body).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// POST /api/v1/admin/comments/{id}/publish
async fn publish_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PublishRequest>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.set_published(id, body.is_published).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_validation_errors_carry_field_details() {
        let error: ApiError = CatalogError::Validation(FieldErrors::single("phone", "Укажите телефон мастера")).into();
        let details = error.error.details.clone().unwrap();
        assert_eq!(details["phone"][0], "Укажите телефон мастера");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let error: ApiError = OrderError::NotFound(5).into();
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }
}
