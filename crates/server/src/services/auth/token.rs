//! HS256 bearer tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use voice_confirm_core::UserId;

use super::AuthError;
use crate::config::AuthConfig;
use crate::models::User;

/// JWT claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::minutes(config.token_ttl_minutes),
        }
    }

    /// Issue a token for `user`.
    ///
    /// # Errors
    ///
    /// `TokenEncoding` if signing fails.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))
    }

    /// Validate signature and expiry; returns the user id.
    ///
    /// # Errors
    ///
    /// `InvalidToken` for any malformed, forged or expired token.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        data.claims.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use voice_confirm_core::Email;

    use super::*;

    fn issuer(ttl_minutes: i64) -> TokenIssuer {
        TokenIssuer::new(&AuthConfig {
            jwt_secret: SecretString::from("kQ8vZ2pX7mN4rT6yB1cD9fG3hJ5lW0sE"),
            token_ttl_minutes: ttl_minutes,
        })
    }

    fn user() -> User {
        User {
            id: UserId::new(42),
            email: Email::parse("merchant@example.com").unwrap(),
            store_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let issuer = issuer(30);
        let token = issuer.issue(&user()).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), UserId::new(42));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Beyond the default 60s leeway
        let issuer = issuer(-5);
        let token = issuer.issue(&user()).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_foreign_token_rejected() {
        let token = issuer(30).issue(&user()).unwrap();
        let other = TokenIssuer::new(&AuthConfig {
            jwt_secret: SecretString::from("Zx9Lm2Qw8Er4Ty6Ui1Op3As5Df7Gh0Jk"),
            token_ttl_minutes: 30,
        });
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(other.verify("not.a.jwt"), Err(AuthError::InvalidToken)));
    }
}
