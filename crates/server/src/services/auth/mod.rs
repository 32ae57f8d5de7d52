//! Merchant authentication.
//!
//! Password logins hashed with Argon2id and HS256 bearer tokens. Routes
//! call [`AuthService`] for the credential lifecycle and [`TokenIssuer`]
//! (held in app state) to mint and check tokens.

mod error;
mod token;

pub use error::AuthError;
pub use token::{Claims, TokenIssuer};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;

use voice_confirm_core::{Email, UserId};

use crate::db::{RepositoryError, UserRepository, UserUpdate};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
pub struct AuthService<'a> {
    users: &'a dyn UserRepository,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn UserRepository) -> Self {
        Self { users }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::EmailTaken` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.users
            .create(&email, &password_hash)
            .await
            .map_err(map_conflict)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong,
    /// `AuthError::InactiveUser` if the account is disabled.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let credentials = self
            .users
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &credentials.password_hash)?;

        if !credentials.user.is_active {
            return Err(AuthError::InactiveUser);
        }
        Ok(credentials.user)
    }

    /// Resolve the user behind a validated token.
    ///
    /// # Errors
    ///
    /// `InvalidToken` if the user no longer exists, `InactiveUser` if
    /// disabled.
    pub async fn current_user(&self, id: UserId) -> Result<User, AuthError> {
        let user = self.users.get(id).await?.ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }
        Ok(user)
    }

    /// Change email and/or password.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`Self::register`].
    #[instrument(skip(self, password))]
    pub async fn update_profile(
        &self,
        id: UserId,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<User, AuthError> {
        let email = email.map(Email::parse).transpose()?;
        let password_hash = match password {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        self.users
            .update(
                id,
                UserUpdate {
                    email,
                    password_hash,
                },
            )
            .await
            .map_err(map_conflict)
    }
}

fn map_conflict(err: RepositoryError) -> AuthError {
    match err {
        RepositoryError::Conflict(_) => AuthError::EmailTaken,
        other => AuthError::Repository(other),
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// `PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_register_and_login() {
        let users = MemoryStore::default();
        let auth = AuthService::new(&users);

        let user = auth
            .register("Merchant@Example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(user.email.as_str(), "merchant@example.com");

        let logged_in = auth
            .login("merchant@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        assert!(matches!(
            auth.login("merchant@example.com", "wrong password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@example.com", "correct horse").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let users = MemoryStore::default();
        let auth = AuthService::new(&users);

        assert!(matches!(
            auth.register("merchant@example.com", "short").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            auth.register("not-an-email", "long enough").await,
            Err(AuthError::InvalidEmail(_))
        ));

        auth.register("merchant@example.com", "long enough")
            .await
            .unwrap();
        assert!(matches!(
            auth.register("merchant@example.com", "long enough").await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_changes_password() {
        let users = MemoryStore::default();
        let auth = AuthService::new(&users);
        let user = auth
            .register("merchant@example.com", "first password")
            .await
            .unwrap();

        auth.update_profile(user.id, None, Some("second password"))
            .await
            .unwrap();

        assert!(auth.login("merchant@example.com", "first password").await.is_err());
        auth.login("merchant@example.com", "second password")
            .await
            .unwrap();
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same password").unwrap();
        let b = hash_password("same password").unwrap();
        assert_ne!(a, b);
        verify_password("same password", &a).unwrap();
        verify_password("same password", &b).unwrap();
    }
}
