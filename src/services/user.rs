//! User service
//!
//! Registration, login by email or username, cookie sessions, password
//! changes and the editable profile. Administrators are created from the
//! command line; registration always yields a client account.

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, UpdateProfileInput, User, UserRole};
use crate::services::form::{non_blank, FieldErrors, NON_FIELD};
use crate::services::password::{hash_password, password_problems, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::upload::{MediaStore, UploadedFile};

const USERNAME_MAX_CHARS: usize = 150;
const AVATAR_DIR: &str = "users/avatars";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or inactive account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Too many failed logins for this identifier
    #[error("Too many login attempts")]
    RateLimited,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Registration form as submitted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password1: String,
    #[serde(skip_serializing)]
    pub password2: String,
}

/// Password change form as submitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Profile form as submitted; empty strings clear optional fields
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    pub birth_date: String,
    pub telegram_id: String,
    pub github_id: String,
}

impl ProfileForm {
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            birth_date: user.birth_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
            telegram_id: user.telegram_id.clone().unwrap_or_default(),
            github_id: user.github_id.clone().unwrap_or_default(),
        }
    }

    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "username" => self.username = value,
            "email" => self.email = value,
            "birth_date" => self.birth_date = value,
            "telegram_id" => self.telegram_id = value,
            "github_id" => self.github_id = value,
            _ => {}
        }
    }

    fn validate(&self, errors: &mut FieldErrors) -> UpdateProfileInput {
        let username = check_username(&self.username, errors);
        let email = check_email(&self.email, errors);

        let birth_date = match non_blank(Some(&self.birth_date)) {
            None => None,
            Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add("birth_date", "Введите правильную дату.");
                    None
                }
            },
        };

        UpdateProfileInput {
            username,
            email,
            avatar: None,
            birth_date,
            telegram_id: non_blank(Some(&self.telegram_id)),
            github_id: non_blank(Some(&self.github_id)),
        }
    }
}

fn check_username(raw: &str, errors: &mut FieldErrors) -> String {
    let username = raw.trim();
    if username.is_empty() {
        errors.add("username", "Обязательное поле.");
    } else if username.chars().count() > USERNAME_MAX_CHARS {
        errors.add("username", "Имя пользователя не должно превышать 150 символов.");
    } else if !username.chars().all(|c| c.is_alphanumeric() || "@.+-_".contains(c)) {
        errors.add(
            "username",
            "Имя пользователя может содержать только буквы, цифры и символы @/./+/-/_.",
        );
    }
    username.to_string()
}

fn check_email(raw: &str, errors: &mut FieldErrors) -> String {
    let email = raw.trim();
    if email.is_empty() {
        errors.add("email", "Обязательное поле.");
    } else if !is_valid_email(email) {
        errors.add("email", "Введите правильный адрес электронной почты.");
    }
    email.to_string()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !domain.ends_with('.'))
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    rate_limiter: Arc<LoginRateLimiter>,
    media: MediaStore,
    session_lifetime: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        rate_limiter: Arc<LoginRateLimiter>,
        media: MediaStore,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            rate_limiter,
            media,
            session_lifetime: Duration::days(session_days),
        }
    }

    /// Register a client account and log it in
    pub async fn register(&self, form: &RegisterForm) -> Result<(User, Session), UserServiceError> {
        let mut errors = FieldErrors::new();
        let username = check_username(&form.username, &mut errors);
        let email = check_email(&form.email, &mut errors);

        if form.password1.is_empty() {
            errors.add("password1", "Обязательное поле.");
        }
        if form.password1 != form.password2 {
            errors.add("password2", "Введенные пароли не совпадают.");
        } else {
            for problem in password_problems(&form.password1, &username) {
                errors.add("password2", problem);
            }
        }

        if !errors.has("username") && self.user_repo.get_by_username(&username).await?.is_some() {
            errors.add("username", "Пользователь с таким именем уже существует.");
        }
        if !errors.has("email") && self.user_repo.get_by_email(&email).await?.is_some() {
            errors.add("email", "Пользователь с таким email уже существует.");
        }
        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }

        let hash = hash_password(&form.password1).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&User::new(username, email, hash, UserRole::Client))
            .await
            .context("Failed to create user")?;
        let session = self.start_session(user.id).await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok((user, session))
    }

    /// Log in with an email address or a username
    pub async fn login(&self, identifier: &str, password: &str) -> Result<(User, Session), UserServiceError> {
        let identifier = identifier.trim();
        if self.rate_limiter.is_limited(identifier).await {
            tracing::warn!(identifier, "Login rate limited");
            return Err(UserServiceError::RateLimited);
        }

        let user = match self.find_by_identifier(identifier).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.rate_limiter.record_failure(identifier).await;
                return Err(UserServiceError::AuthenticationError("Invalid credentials".to_string()));
            }
        };

        if !verify_password(password, &user.password_hash).context("Failed to verify password")? {
            self.rate_limiter.record_failure(identifier).await;
            tracing::info!(user_id = user.id, "Failed login attempt");
            return Err(UserServiceError::AuthenticationError("Invalid credentials".to_string()));
        }

        self.rate_limiter.clear(identifier).await;
        self.user_repo.touch_last_login(user.id).await?;
        let session = self.start_session(user.id).await?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok((user, session))
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, UserServiceError> {
        if identifier.is_empty() {
            return Ok(None);
        }
        if identifier.contains('@') {
            if let Some(user) = self.user_repo.get_by_email(identifier).await? {
                return Ok(Some(user));
            }
        }
        Ok(self.user_repo.get_by_username(identifier).await?)
    }

    async fn start_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, self.session_lifetime);
        self.session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(session)
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(session_id).await?;
        Ok(())
    }

    /// User behind a session token; expired sessions are removed
    pub async fn validate_session(&self, session_id: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(session_id).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            self.session_repo.delete(session_id).await?;
            return Ok(None);
        }
        Ok(self
            .user_repo
            .get_by_id(session.user_id)
            .await?
            .filter(|user| user.is_active))
    }

    /// Change the password, keeping `session_id` and ending every other session
    pub async fn change_password(
        &self,
        user: &User,
        session_id: &str,
        form: &PasswordChangeForm,
    ) -> Result<(), UserServiceError> {
        let mut errors = FieldErrors::new();
        if !verify_password(&form.old_password, &user.password_hash).context("Failed to verify password")? {
            errors.add(
                "old_password",
                "Ваш старый пароль введен неправильно. Пожалуйста, введите его снова.",
            );
        }
        if form.new_password1 != form.new_password2 {
            errors.add("new_password2", "Введенные пароли не совпадают.");
        } else {
            for problem in password_problems(&form.new_password1, &user.username) {
                errors.add("new_password2", problem);
            }
        }
        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }

        let hash = hash_password(&form.new_password1).context("Failed to hash password")?;
        self.user_repo.update_password(user.id, &hash).await?;
        let ended = self.session_repo.delete_by_user_except(user.id, session_id).await?;

        tracing::info!(user_id = user.id, ended_sessions = ended, "Password changed");
        Ok(())
    }

    /// Update profile fields and optionally replace the avatar
    pub async fn update_profile(
        &self,
        user: &User,
        form: &ProfileForm,
        avatar: Option<UploadedFile>,
    ) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();
        let mut input = form.validate(&mut errors);

        if !errors.has("username") && input.username != user.username {
            if let Some(other) = self.user_repo.get_by_username(&input.username).await? {
                if other.id != user.id {
                    errors.add("username", "Пользователь с таким именем уже существует.");
                }
            }
        }
        if !errors.has("email") {
            if let Some(other) = self.user_repo.get_by_email(&input.email).await? {
                if other.id != user.id {
                    errors.add("email", "Пользователь с таким email уже существует.");
                }
            }
        }
        if let Some(file) = &avatar {
            if let Err(e) = self.media.check(file) {
                errors.add("avatar", e.to_string());
            }
        }
        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }

        if let Some(file) = &avatar {
            let path = self
                .media
                .save_image(AVATAR_DIR, file)
                .await
                .context("Failed to store avatar")?;
            input.avatar = Some(path);
        }

        let mut updated = user.clone();
        updated.username = input.username;
        updated.email = input.email;
        if input.avatar.is_some() {
            updated.avatar = input.avatar;
        }
        updated.birth_date = input.birth_date;
        updated.telegram_id = input.telegram_id;
        updated.github_id = input.github_id;

        let updated = self.user_repo.update(&updated).await.context("Failed to update user")?;
        tracing::info!(user_id = updated.id, "Profile updated");
        Ok(updated)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))
    }

    /// Create an administrator account from the command line
    pub async fn create_admin(&self, username: &str, email: &str, password: &str) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();
        let username = check_username(username, &mut errors);
        let email = check_email(email, &mut errors);
        for problem in password_problems(password, &username) {
            errors.add("password", problem);
        }
        if self.user_repo.get_by_email(&email).await?.is_some()
            || self.user_repo.get_by_username(&username).await?.is_some()
        {
            errors.add(NON_FIELD, "Пользователь с таким именем или email уже существует.");
        }
        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }

        let hash = hash_password(password).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&User::new(username, email, hash, UserRole::Admin))
            .await
            .context("Failed to create admin")?;
        tracing::info!(user_id = user.id, "Administrator created");
        Ok(user)
    }

    /// Change the role of the account with this email
    pub async fn set_role(&self, email: &str, role: UserRole) -> Result<User, UserServiceError> {
        let mut user = self
            .user_repo
            .get_by_email(email.trim())
            .await?
            .ok_or_else(|| UserServiceError::NotFound(email.to_string()))?;
        user.role = role;
        let user = self.user_repo.update(&user).await.context("Failed to update role")?;
        tracing::info!(user_id = user.id, role = %role, "Role changed");
        Ok(user)
    }

    pub async fn user_count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await?)
    }

    /// Remove expired sessions and stale login-attempt records
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let removed = self.session_repo.delete_expired().await?;
        self.rate_limiter.cleanup().await;
        if removed > 0 {
            tracing::debug!(removed, "Expired sessions removed");
        }
        Ok(removed)
    }
}
