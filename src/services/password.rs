//! Password hashing and strength rules
//!
//! Hashes are Argon2id PHC strings with a random salt per password.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

/// Check a password against a stored hash.
///
/// A malformed hash is an error; a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

/// Human-readable problems with a new password, empty when acceptable.
pub fn password_problems(password: &str, username: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "Пароль слишком короткий. Он должен содержать как минимум {} символов.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("Пароль не может состоять только из цифр.".to_string());
    }
    if !username.is_empty() && password.to_lowercase() == username.to_lowercase() {
        problems.push("Пароль слишком похож на имя пользователя.".to_string());
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id_and_salted() {
        let first = hash_password("same_password").unwrap();
        let second = hash_password("same_password").unwrap();

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[test]
    fn test_password_problems() {
        assert!(password_problems("Str0ngPassw0rd", "ivan").is_empty());
        assert_eq!(password_problems("short", "ivan").len(), 1);
        assert_eq!(password_problems("12345678", "ivan").len(), 1);
        assert_eq!(password_problems("IvanIvanov", "ivanivanov").len(), 1);
        assert_eq!(password_problems("1234", "ivan").len(), 2);
    }
}
