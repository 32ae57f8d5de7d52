//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `APP_BASE_URL` - Public URL Shopify and Twilio call back into
//! - `APP_JWT_SECRET` - Bearer token signing secret (min 32 chars, high entropy)
//! - `SHOPIFY_API_KEY` - Shopify app client id
//! - `SHOPIFY_API_SECRET` - Shopify app client secret (also signs webhooks)
//! - `TWILIO_ACCOUNT_SID` - Twilio account SID
//! - `TWILIO_AUTH_TOKEN` - Twilio auth token (also signs callbacks)
//! - `TWILIO_PHONE_NUMBER` - Caller id for outbound calls
//! - `SUPPORT_PHONE_NUMBER` - Number dialed when the customer presses 2
//!
//! ## Optional
//! - `APP_HOST` - Bind address (default: 127.0.0.1)
//! - `APP_PORT` - Listen port (default: 8000)
//! - `FRONTEND_URL` - Dashboard origin (default: <http://localhost:5173>)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2024-01)
//! - `SHOPIFY_SCOPES` - Comma-separated OAuth scopes
//! - `JWT_EXPIRY_MINUTES` - Bearer token lifetime (default: 30)
//! - `DEFAULT_COUNTRY_CODE` - Country code for national customer numbers
//! - `TWILIO_VALIDATE_SIGNATURES` - Verify `X-Twilio-Signature` (default: true)
//! - `RETRY_POLL_SECONDS` - Redial queue poll interval (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `LOG_FORMAT` - `json` for structured logs (default: text)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

pub const DEFAULT_SCOPES: &[&str] = &[
    "read_orders",
    "write_orders",
    "read_products",
    "read_customers",
    "read_shopify_payments_payouts",
    "read_shopify_payments_disputes",
];

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    /// Public base URL, without trailing slash
    pub base_url: String,
    /// Dashboard URL used for the post-install redirect and CORS
    pub frontend_url: String,
    pub auth: AuthConfig,
    pub shopify: ShopifyAppConfig,
    pub twilio: TwilioConfig,
    /// Country code (digits) applied to national customer phone numbers
    pub default_country_code: Option<String>,
    pub retry_poll_interval: Duration,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Bearer token settings.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_minutes: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

/// Shopify app credentials.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ShopifyAppConfig {
    pub api_key: String,
    /// Client secret; signs OAuth callbacks and webhook bodies
    pub api_secret: SecretString,
    pub api_version: String,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for ShopifyAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAppConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Twilio account settings.
#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Caller id (E.164) for outbound calls
    pub from_number: String,
    /// Support line the IVR transfers to
    pub support_number: String,
    pub validate_signatures: bool,
    /// REST API origin; overridable for tests
    pub api_base: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("support_number", &self.support_number)
            .field("validate_signatures", &self.validate_signatures)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let host = parse_env("APP_HOST", "127.0.0.1")?;
        let port = parse_env("APP_PORT", "8000")?;
        let base_url = get_url("APP_BASE_URL", None)?;
        let frontend_url = get_url("FRONTEND_URL", Some("http://localhost:5173"))?;

        let jwt_secret = get_validated_secret("APP_JWT_SECRET")?;
        validate_secret_length(&jwt_secret, "APP_JWT_SECRET")?;
        let auth = AuthConfig {
            jwt_secret,
            token_ttl_minutes: parse_env("JWT_EXPIRY_MINUTES", "30")?,
        };

        let retry_poll_secs: u64 = parse_env("RETRY_POLL_SECONDS", "15")?;
        if retry_poll_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "RETRY_POLL_SECONDS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let default_country_code = get_optional_env("DEFAULT_COUNTRY_CODE")
            .map(|code| code.trim().trim_start_matches('+').to_string())
            .filter(|code| !code.is_empty());
        if let Some(code) = &default_country_code
            && (code.len() > 3 || !code.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ConfigError::InvalidEnvVar(
                "DEFAULT_COUNTRY_CODE".to_string(),
                "must be 1-3 digits".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            frontend_url,
            auth,
            shopify: ShopifyAppConfig::from_env()?,
            twilio: TwilioConfig::from_env()?,
            default_country_code,
            retry_poll_interval: Duration::from_secs(retry_poll_secs),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Absolute URL for an `/api` path on this server.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }
}

impl ShopifyAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scopes = get_optional_env("SHOPIFY_SCOPES").map_or_else(
            || DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            },
        );

        Ok(Self {
            api_key: get_required_env("SHOPIFY_API_KEY")?,
            api_secret: get_validated_secret("SHOPIFY_API_SECRET")?,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", "2024-01"),
            scopes,
        })
    }
}

impl TwilioConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            account_sid: get_required_env("TWILIO_ACCOUNT_SID")?,
            auth_token: get_validated_secret("TWILIO_AUTH_TOKEN")?,
            from_number: get_required_env("TWILIO_PHONE_NUMBER")?,
            support_number: get_required_env("SUPPORT_PHONE_NUMBER")?,
            validate_signatures: parse_env("TWILIO_VALIDATE_SIGNATURES", "true")?,
            api_base: get_env_or_default("TWILIO_API_BASE", "https://api.twilio.com"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Read an absolute http(s) URL and strip any trailing slash.
fn get_url(key: &str, default: Option<&str>) -> Result<String, ConfigError> {
    let raw = match default {
        Some(default) => get_env_or_default(key, default),
        None => get_required_env(key)?,
    };
    let parsed = url::Url::parse(&raw)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an http(s) URL".to_string(),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_placeholder_secrets_rejected() {
        for value in ["your-api-key-here", "changeme123", "my_jwt_secret_value_1234567890"] {
            assert!(
                matches!(
                    validate_secret_strength(value, "APP_JWT_SECRET"),
                    Err(ConfigError::InsecureSecret(_, _))
                ),
                "{value}"
            );
        }
    }

    #[test]
    fn test_low_entropy_secret_rejected() {
        let result = validate_secret_strength(&"ab".repeat(20), "APP_JWT_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_random_secret_accepted() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "X").is_ok());
        // Twilio auth tokens are 32 lowercase hex characters
        assert!(validate_secret_strength("9f86d081884c7d659a2feaa0c55ad015", "X").is_ok());
    }

    #[test]
    fn test_secret_length() {
        assert!(validate_secret_length(&SecretString::from("short"), "X").is_err());
        assert!(validate_secret_length(&SecretString::from("a".repeat(32)), "X").is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let shopify = ShopifyAppConfig {
            api_key: "public_key_value".to_string(),
            api_secret: SecretString::from("super_hidden_api_secret"),
            api_version: "2024-01".to_string(),
            scopes: vec!["read_orders".to_string()],
        };
        let twilio = TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: SecretString::from("super_hidden_auth_token"),
            from_number: "+15005550006".to_string(),
            support_number: "+15005550007".to_string(),
            validate_signatures: true,
            api_base: "https://api.twilio.com".to_string(),
        };

        let debug_output = format!("{shopify:?} {twilio:?}");
        assert!(debug_output.contains("public_key_value"));
        assert!(debug_output.contains("AC123"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_hidden_api_secret"));
        assert!(!debug_output.contains("super_hidden_auth_token"));
    }
}
