//! HTML page plumbing
//!
//! [`Page`] carries what every rendered page needs (the viewer, the visitor
//! id for flash messages, the request path). [`PageError`] responses are
//! turned into the templated error page by [`render_error_pages`].

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Datelike;
use std::convert::Infallible;
use tera::Context as TeraContext;

use super::middleware::{AppState, MaybeUser, Visitor};
use crate::models::User;
use crate::services::{
    BlogError, CatalogError, CommentError, FlashLevel, FlashMessage, OrderError, ReviewError, UserServiceError,
};
use crate::theme::{simple_error_page, CurrentUser, StandardTemplateVars};

/// Request context for rendering pages
#[derive(Debug, Clone)]
pub struct Page {
    pub user: Option<User>,
    pub visitor: Visitor,
    pub path: String,
}

impl<S> FromRequestParts<S> for Page
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        let visitor = Visitor::from_request_parts(parts, state).await?;
        Ok(Self {
            user,
            visitor,
            path: parts.uri.path().to_string(),
        })
    }
}

impl Page {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_staff(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_staff)
    }

    /// Render a template with the standard variables and pending flashes
    pub async fn render(&self, state: &AppState, template: &str, mut context: TeraContext) -> Result<Response, PageError> {
        StandardTemplateVars {
            site_name: state.config.site.name.clone(),
            request_path: self.path.clone(),
            year: chrono::Utc::now().year(),
            current_user: self.user.as_ref().map(CurrentUser::from),
        }
        .insert_into(&mut context);

        let flashes: Vec<FlashMessage> = match state.visitors.take_flashes(&self.visitor.id).await {
            Ok(flashes) => flashes,
            Err(e) => {
                tracing::warn!("Failed to read flash messages: {}", e);
                Vec::new()
            }
        };
        context.insert("flashes", &flashes);

        let html = state.theme.render(template, &context).map_err(PageError::Internal)?;
        Ok(Html(html).into_response())
    }

    /// Queue a flash message for the next rendered page
    pub async fn flash(&self, state: &AppState, level: FlashLevel, text: impl Into<String>) {
        if let Err(e) = state.visitors.push_flash(&self.visitor.id, level, text).await {
            tracing::warn!("Failed to store flash message: {}", e);
        }
    }

    /// Flash a message and redirect
    pub async fn redirect_with(&self, state: &AppState, to: &str, level: FlashLevel, text: impl Into<String>) -> Response {
        self.flash(state, level, text).await;
        Redirect::to(to).into_response()
    }
}

/// Error outcome of an HTML handler
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

/// Marker left on error responses for [`render_error_pages`]
#[derive(Debug, Clone)]
struct ErrorPage {
    message: String,
}

impl PageError {
    fn status(&self) -> StatusCode {
        match self {
            PageError::NotFound => StatusCode::NOT_FOUND,
            PageError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            PageError::NotFound => "Страница не найдена".to_string(),
            PageError::BadRequest(message) => message.clone(),
            PageError::Internal(_) => "Внутренняя ошибка сервера".to_string(),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        if let PageError::Internal(e) = &self {
            tracing::error!("Request failed: {:#}", e);
        }
        let status = self.status();
        let message = self.message();
        let mut response = (status, Html(simple_error_page(status.as_u16(), &message))).into_response();
        response.extensions_mut().insert(ErrorPage { message });
        response
    }
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::Internal(e)
    }
}

impl From<CatalogError> for PageError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(_) => PageError::NotFound,
            CatalogError::Validation(errors) => PageError::BadRequest(errors.to_string()),
            CatalogError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<OrderError> for PageError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(_) => PageError::NotFound,
            OrderError::Validation(errors) => PageError::BadRequest(errors.to_string()),
            OrderError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<ReviewError> for PageError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::NotFound(_) => PageError::NotFound,
            ReviewError::Validation(errors) => PageError::BadRequest(errors.to_string()),
            ReviewError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<BlogError> for PageError {
    fn from(e: BlogError) -> Self {
        match e {
            BlogError::NotFound(_) => PageError::NotFound,
            BlogError::Validation(errors) => PageError::BadRequest(errors.to_string()),
            BlogError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<CommentError> for PageError {
    fn from(e: CommentError) -> Self {
        match e {
            CommentError::NotFound(_) => PageError::NotFound,
            CommentError::Validation(errors) => PageError::BadRequest(errors.to_string()),
            CommentError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<UserServiceError> for PageError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound(_) => PageError::NotFound,
            UserServiceError::Validation(errors) => PageError::BadRequest(errors.to_string()),
            UserServiceError::AuthenticationError(message) => PageError::BadRequest(message),
            UserServiceError::RateLimited => PageError::BadRequest("Too many login attempts".to_string()),
            UserServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

/// Replace bare error bodies with the templated error page
///
/// Also covers router-level 404s, which carry no marker.
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let wants_html = !request.uri().path().starts_with("/api/");
    let page = Page {
        user: request.extensions().get::<MaybeUser>().and_then(|u| u.0.clone()),
        visitor: request
            .extensions()
            .get::<Visitor>()
            .cloned()
            .unwrap_or_else(|| Visitor {
                id: String::new(),
                is_new: true,
            }),
        path: request.uri().path().to_string(),
    };

    let response = next.run(request).await;
    let status = response.status();

    let message = match response.extensions().get::<ErrorPage>() {
        Some(marker) => marker.message.clone(),
        None if status == StatusCode::NOT_FOUND && wants_html && is_bare(&response) => {
            PageError::NotFound.message()
        }
        None => return response,
    };

    let mut context = TeraContext::new();
    context.insert("status", &status.as_u16());
    context.insert("message", &message);
    match page.render(&state, "error.html", context).await {
        Ok(mut rendered) => {
            *rendered.status_mut() = status;
            rendered
        }
        Err(_) => response,
    }
}

/// Router fallbacks answer with an empty body
fn is_bare(response: &Response) -> bool {
    response.headers().get(axum::http::header::CONTENT_TYPE).is_none()
}

/// Empty 404 body for unknown routes
pub async fn not_found_fallback() -> Response {
    (StatusCode::NOT_FOUND, Body::empty()).into_response()
}
