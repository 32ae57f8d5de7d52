//! Shopify Admin API adapter.
//!
//! Only the handful of REST endpoints the confirmation flow needs: the
//! OAuth code exchange, single-order and shop lookups, and webhook
//! subscriptions. Signature checks for OAuth callbacks and webhooks live in
//! [`oauth`] and [`webhook`].

mod client;
pub mod oauth;
pub mod types;
pub mod webhook;

pub use client::ShopifyClient;
pub use types::{OrderPayload, ShopInfo};

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use voice_confirm_core::ShopDomain;

use crate::models::Store;

/// Webhook topics every connected store subscribes to.
pub const WEBHOOK_TOPICS: &[&str] = &["orders/create", "orders/cancelled"];

/// Errors that can occur when talking to Shopify.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Shopify answered with a non-success status.
    #[error("Shopify API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The OAuth code exchange was rejected.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The access token was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The commerce platform as seen by the rest of the server.
///
/// Store-scoped calls take the [`Store`] so the adapter can use its shop
/// domain and access token; the adapter itself holds only app credentials.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// Exchange an OAuth authorization code for an offline access token.
    async fn exchange_code(&self, shop: &ShopDomain, code: &str)
    -> Result<SecretString, ShopifyError>;

    /// Fetch a single order by its Shopify id.
    async fn fetch_order(&self, store: &Store, order_id: &str)
    -> Result<OrderPayload, ShopifyError>;

    /// Fetch shop details.
    async fn fetch_shop(&self, store: &Store) -> Result<ShopInfo, ShopifyError>;

    /// Subscribe `address` to `topic`; returns the webhook id.
    async fn register_webhook(
        &self,
        shop: &ShopDomain,
        access_token: &SecretString,
        topic: &str,
        address: &str,
    ) -> Result<i64, ShopifyError>;

    /// Remove a webhook subscription. `false` if Shopify no longer knew it.
    async fn deregister_webhook(&self, store: &Store, webhook_id: i64)
    -> Result<bool, ShopifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shopify_error_display() {
        let err = ShopifyError::Api {
            status: 422,
            message: "address is invalid".to_string(),
        };
        assert_eq!(err.to_string(), "Shopify API error (422): address is invalid");
        assert_eq!(
            ShopifyError::NotFound("order 7".to_string()).to_string(),
            "Not found: order 7"
        );
    }
}
