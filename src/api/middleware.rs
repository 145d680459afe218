//! HTTP middleware
//!
//! Contains middleware for:
//! - Identity: session cookie to user, visitor cookie to visitor state
//! - Authorization for the staff JSON API (401/403)
//! - Login and staff gates for HTML pages (redirects with flash messages)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::models::User;
use crate::services::FlashLevel;

pub use super::state::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const VISITOR_COOKIE: &str = "visitor";

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The logged-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Anonymous visitor identity carried by the `visitor` cookie
#[derive(Debug, Clone)]
pub struct Visitor {
    pub id: String,
    pub is_new: bool,
}

/// Session token of the current request, if logged in
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Session token when there is one; never rejects
#[derive(Debug, Clone)]
pub struct MaybeSessionToken(pub Option<String>);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Log the cause and hide it from the client
    pub fn internal_error(error: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", error);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

/// Value of a cookie from the request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for an HttpOnly cookie; `max_age_secs == 0` removes it
pub fn cookie_header(name: &str, value: &str, max_age_secs: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    ))
    .ok()
}

fn valid_visitor_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Identity middleware
///
/// Resolves the `session` cookie to a user and the `visitor` cookie to a
/// visitor id, issuing a fresh visitor cookie when missing. A stale session
/// cookie is cleared.
pub async fn identity(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let mut stale_session = false;
    let mut user = None;
    if let Some(token) = read_cookie(request.headers(), SESSION_COOKIE) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(found)) => {
                user = Some(found);
                request.extensions_mut().insert(SessionToken(token));
            }
            Ok(None) => stale_session = true,
            Err(e) => tracing::error!("Session validation failed: {}", e),
        }
    }

    let visitor = match read_cookie(request.headers(), VISITOR_COOKIE) {
        Some(id) if valid_visitor_id(&id) => Visitor { id, is_new: false },
        _ => Visitor {
            id: uuid::Uuid::new_v4().to_string(),
            is_new: true,
        },
    };

    if let Some(user) = &user {
        request.extensions_mut().insert(AuthenticatedUser(user.clone()));
    }
    request.extensions_mut().insert(MaybeUser(user));
    request.extensions_mut().insert(visitor.clone());

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    let session_cookie_set = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|value| value.as_bytes().starts_with(b"session="));
    if visitor.is_new {
        let max_age = state.config.session.cookie_age_days * 24 * 60 * 60;
        if let Some(cookie) = cookie_header(VISITOR_COOKIE, &visitor.id, max_age) {
            headers.append(header::SET_COOKIE, cookie);
        }
    }
    if stale_session && !session_cookie_set {
        if let Some(cookie) = cookie_header(SESSION_COOKIE, "", 0) {
            headers.append(header::SET_COOKIE, cookie);
        }
    }
    response
}

/// Staff authorization middleware for the JSON API
pub async fn require_staff(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_staff() {
        return Err(ApiError::forbidden("Staff privileges required"));
    }

    Ok(next.run(request).await)
}

/// Login page URL that returns to `path` afterwards
pub fn login_redirect(path_and_query: &str) -> Response {
    let target = format!("/users/login/?next={}", urlencoding::encode(path_and_query));
    Redirect::to(&target).into_response()
}

fn path_and_query(request: &Request) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

/// Login gate for HTML pages
pub async fn require_login_page(request: Request, next: Next) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return login_redirect(&path_and_query(&request));
    }
    next.run(request).await
}

async fn staff_gate(state: &AppState, request: Request, next: Next, denied: &str) -> Response {
    let Some(AuthenticatedUser(user)) = request.extensions().get::<AuthenticatedUser>() else {
        return login_redirect(&path_and_query(&request));
    };
    if user.is_staff() {
        return next.run(request).await;
    }

    tracing::info!(user_id = user.id, path = %request.uri().path(), "Staff page denied");
    if let Some(visitor) = request.extensions().get::<Visitor>() {
        if let Err(e) = state.visitors.push_flash(&visitor.id, FlashLevel::Error, denied).await {
            tracing::warn!("Failed to store flash message: {}", e);
        }
    }
    Redirect::to("/").into_response()
}

/// Staff gate for HTML sections
pub async fn require_staff_page(State(state): State<AppState>, request: Request, next: Next) -> Response {
    staff_gate(&state, request, next, "У вас нет доступа к этому разделу.").await
}

/// Staff gate for a single staff-only record page
pub async fn require_staff_record_page(State(state): State<AppState>, request: Request, next: Next) -> Response {
    staff_gate(&state, request, next, "У вас нет доступа к этой странице.").await
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<MaybeUser>().cloned().unwrap_or(MaybeUser(None)))
    }
}

impl<S> FromRequestParts<S> for MaybeSessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSessionToken(
            parts.extensions.get::<SessionToken>().map(|token| token.0.clone()),
        ))
    }
}

impl<S> FromRequestParts<S> for Visitor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Visitor>().cloned().unwrap_or_else(|| Visitor {
            id: uuid::Uuid::new_v4().to_string(),
            is_new: true,
        }))
    }
}
