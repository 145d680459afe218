//! Account pages
//!
//! Handles:
//! - /users/register/ - registration, logs the new user in
//! - /users/login/ and /users/logout/ - session cookie management
//! - /users/profile/... - profile view and edit
//! - /users/password_change/

use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::{header, StatusCode},
    middleware::from_fn,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::common::{read_multipart, safe_next};
use super::middleware::{
    cookie_header, require_login_page, AppState, AuthenticatedUser, MaybeSessionToken, SessionToken, SESSION_COOKIE,
};
use super::page::{Page, PageError};
use crate::models::Session;
use crate::services::{
    FieldErrors, FlashLevel, PasswordChangeForm, ProfileForm, RegisterForm, UserServiceError, NON_FIELD,
};

pub fn router() -> Router<AppState> {
    let members = Router::new()
        .route("/users/profile/{user_id}/", get(profile))
        .route("/users/profile/edit/", get(profile_edit_form).post(profile_edit))
        .route("/users/password_change/", get(password_change_form).post(password_change))
        .route_layer(from_fn(require_login_page));

    Router::new()
        .route("/users/register/", get(register_form).post(register))
        .route("/users/login/", get(login_form).post(login))
        .route("/users/logout/", post(logout))
        .merge(members)
}

/// Redirect that also starts the session cookie
fn redirect_with_session(state: &AppState, to: &str, session: &Session) -> Response {
    let mut response = Redirect::to(to).into_response();
    let max_age = state.config.session.cookie_age_days * 24 * 60 * 60;
    if let Some(cookie) = cookie_header(SESSION_COOKIE, &session.id, max_age) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

async fn render_register(state: &AppState, page: &Page, form: &RegisterForm, errors: &FieldErrors) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("title", "Регистрация");
    context.insert("form", form);
    context.insert("errors", errors);
    page.render(state, "users/register.html", context).await
}

/// GET /users/register/
async fn register_form(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    if page.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    render_register(&state, &page, &RegisterForm::default(), &FieldErrors::new()).await
}

/// POST /users/register/
async fn register(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<RegisterForm>,
) -> Result<Response, PageError> {
    if page.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    match state.user_service.register(&form).await {
        Ok((user, session)) => {
            page.flash(
                &state,
                FlashLevel::Success,
                format!("Добро пожаловать, {}! Регистрация прошла успешно.", user.username),
            )
            .await;
            Ok(redirect_with_session(&state, "/", &session))
        }
        Err(UserServiceError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Пожалуйста, исправьте ошибки в форме регистрации.")
                .await;
            render_register(&state, &page, &form, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginForm {
    /// Email or username
    username: String,
    password: String,
    next: Option<String>,
}

async fn render_login(
    state: &AppState,
    page: &Page,
    username: &str,
    next: Option<&str>,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("title", "Вход");
    context.insert("username", username);
    context.insert("next", &safe_next(next));
    context.insert("errors", errors);
    page.render(state, "users/login.html", context).await
}

/// GET /users/login/
async fn login_form(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<NextQuery>,
) -> Result<Response, PageError> {
    if page.user.is_some() {
        let to = safe_next(query.next.as_deref()).unwrap_or_else(|| "/".to_string());
        return Ok(Redirect::to(&to).into_response());
    }
    render_login(&state, &page, "", query.next.as_deref(), &FieldErrors::new()).await
}

/// POST /users/login/
async fn login(State(state): State<AppState>, page: Page, Form(form): Form<LoginForm>) -> Result<Response, PageError> {
    match state.user_service.login(&form.username, &form.password).await {
        Ok((user, session)) => {
            page.flash(&state, FlashLevel::Success, format!("С возвращением, {}!", user.username))
                .await;
            let to = safe_next(form.next.as_deref()).unwrap_or_else(|| "/".to_string());
            Ok(redirect_with_session(&state, &to, &session))
        }
        Err(UserServiceError::AuthenticationError(_)) => {
            let message = "Неверное имя пользователя или пароль. Попробуйте снова.";
            page.flash(&state, FlashLevel::Error, message).await;
            let errors = FieldErrors::single(NON_FIELD, message);
            render_login(&state, &page, &form.username, form.next.as_deref(), &errors).await
        }
        Err(UserServiceError::RateLimited) => {
            let errors = FieldErrors::single(NON_FIELD, "Слишком много попыток входа. Попробуйте позже.");
            let mut response = render_login(&state, &page, &form.username, form.next.as_deref(), &errors).await?;
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            Ok(response)
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /users/logout/
async fn logout(
    State(state): State<AppState>,
    page: Page,
    MaybeSessionToken(token): MaybeSessionToken,
) -> Result<Response, PageError> {
    if let Some(token) = token {
        state.user_service.logout(&token).await?;
        if let Some(user) = page.user() {
            tracing::info!(user_id = user.id, "User logged out");
        }
    }

    let mut response = page
        .redirect_with(&state, "/", FlashLevel::Info, "Вы успешно вышли из системы.")
        .await;
    if let Some(cookie) = cookie_header(SESSION_COOKIE, "", 0) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

/// GET /users/profile/{user_id}/
async fn profile(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(viewer): AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Response, PageError> {
    let profile_user = state.user_service.get_by_id(user_id).await?;

    let mut context = TeraContext::new();
    context.insert("title", &format!("Профиль пользователя {}", profile_user.username));
    context.insert("profile_user", &profile_user);
    context.insert("avatar_url", &profile_user.avatar_url());
    context.insert("is_own_profile", &(viewer.id == profile_user.id));
    page.render(&state, "users/profile_detail.html", context).await
}

async fn render_profile_form(
    state: &AppState,
    page: &Page,
    form: &ProfileForm,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("title", "Редактирование профиля");
    context.insert("form", form);
    context.insert("errors", errors);
    page.render(state, "users/profile_edit.html", context).await
}

/// GET /users/profile/edit/
async fn profile_edit_form(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    render_profile_form(&state, &page, &ProfileForm::from_user(&user), &FieldErrors::new()).await
}

/// POST /users/profile/edit/ (multipart, optional avatar)
async fn profile_edit(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let mut submitted = read_multipart(multipart).await?;
    let mut form = ProfileForm::default();
    for (name, value) in std::mem::take(&mut submitted.fields) {
        form.set_field(&name, value);
    }
    let avatar = submitted.take_file("avatar");

    match state.user_service.update_profile(&user, &form, avatar).await {
        Ok(updated) => Ok(page
            .redirect_with(
                &state,
                &format!("/users/profile/{}/", updated.id),
                FlashLevel::Success,
                "Ваш профиль успешно обновлен.",
            )
            .await),
        Err(UserServiceError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Пожалуйста, исправьте ошибки в форме.").await;
            render_profile_form(&state, &page, &form, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_password_form(state: &AppState, page: &Page, errors: &FieldErrors) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("title", "Смена пароля");
    context.insert("errors", errors);
    page.render(state, "users/password_change.html", context).await
}

/// GET /users/password_change/
async fn password_change_form(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    render_password_form(&state, &page, &FieldErrors::new()).await
}

/// POST /users/password_change/ - other sessions of the user are ended
async fn password_change(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Extension(SessionToken(token)): Extension<SessionToken>,
    Form(form): Form<PasswordChangeForm>,
) -> Result<Response, PageError> {
    match state.user_service.change_password(&user, &token, &form).await {
        Ok(()) => Ok(page
            .redirect_with(
                &state,
                &format!("/users/profile/{}/", user.id),
                FlashLevel::Success,
                "Ваш пароль был успешно изменен.",
            )
            .await),
        Err(UserServiceError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Пожалуйста, исправьте ошибки при смене пароля.")
                .await;
            render_password_form(&state, &page, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}
