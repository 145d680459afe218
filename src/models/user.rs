//! User model
//!
//! Accounts log in with their email (or username). Staff users can manage
//! the catalog, orders and the blog; clients can comment and like posts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Unique, used as the login identifier
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    /// Stored path under the media directory
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub telegram_id: Option<String>,
    pub github_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new active user. The password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            role,
            is_active: true,
            avatar: None,
            birth_date: None,
            telegram_id: None,
            github_id: None,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Staff pages are open to staff and administrators
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Staff)
    }

    /// Avatar URL for templates, falling back to Gravatar
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(path) if !path.is_empty() => format!("/media/{}", path),
            _ => {
                let hash = format!("{:x}", md5::compute(self.email.trim().to_lowercase()));
                format!("https://www.gravatar.com/avatar/{}?d=mp&s=120", hash)
            }
        }
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access, created from the command line
    Admin,
    /// Manages orders, services, masters and the blog
    Staff,
    /// Regular site visitor with an account
    #[default]
    Client,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Staff => write!(f, "staff"),
            UserRole::Client => write!(f, "client"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            "client" => Ok(UserRole::Client),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Editable profile fields
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub username: String,
    pub email: String,
    /// `Some` replaces the stored avatar
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub telegram_id: Option<String>,
    pub github_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        let mut user = User::new("a".into(), "a@example.com".into(), "h".into(), UserRole::Client);
        assert!(!user.is_staff());
        user.role = UserRole::Staff;
        assert!(user.is_staff());
        assert!(!user.is_admin());
        user.role = UserRole::Admin;
        assert!(user.is_staff());
        assert!(user.is_admin());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Admin, UserRole::Staff, UserRole::Client] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert!("editor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_avatar_url() {
        let mut user = User::new("a".into(), " A@Example.com".into(), "h".into(), UserRole::Client);
        let expected = format!("{:x}", md5::compute("a@example.com"));
        assert!(user.avatar_url().contains(&expected));

        user.avatar = Some("users/avatars/x.png".into());
        assert_eq!(user.avatar_url(), "/media/users/avatars/x.png");
    }
}
