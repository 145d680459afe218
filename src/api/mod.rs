//! HTTP layer - handlers and routing
//!
//! This module contains every route of the site:
//! - Landing, about and thank-you pages
//! - Masters and services, including the JSON helpers for the forms
//! - Booking and staff order pages
//! - Review form
//! - Blog with comments and likes
//! - User accounts
//! - Staff JSON API under /api/v1/admin
//! - Sitemap, health check, static assets and uploaded media

pub mod admin;
pub mod auth;
pub mod blog;
pub mod catalog;
pub mod common;
pub mod landing;
pub mod middleware;
pub mod orders;
pub mod page;
pub mod reviews;
pub mod site;
pub mod state;
pub mod static_files;


use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState};

/// Multipart overhead allowed on top of the largest upload
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the page routes
pub fn build_site_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(landing::router())
        .merge(catalog::router(state.clone()))
        .merge(orders::router(state))
        .merge(reviews::router())
        .merge(blog::router())
        .merge(auth::router())
        .merge(site::router())
        .merge(static_files::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_file_size as usize + FORM_OVERHEAD_BYTES;

    Router::new()
        .nest("/api/v1/admin", admin::router())
        .merge(build_site_router(state.clone()))
        .fallback(page::not_found_fallback)
        // Error pages need the identity extensions, so they sit inside it
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            page::render_error_pages,
        ))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::identity))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
