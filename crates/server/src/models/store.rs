//! Connected Shopify stores.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

use voice_confirm_core::{ShopDomain, StoreId, VoiceSettings};

/// A connected store and its Admin API credentials.
///
/// Implements `Debug` manually to redact credentials.
#[derive(Clone)]
pub struct Store {
    pub id: StoreId,
    pub shop_domain: ShopDomain,
    pub access_token: SecretString,
    /// Per-store webhook signing secret; `None` means the app secret signs
    /// webhooks (the normal case for public apps)
    pub webhook_secret: Option<SecretString>,
    /// Webhook subscriptions to remove on disconnect
    pub webhook_ids: Vec<i64>,
    pub voice_settings: VoiceSettings,
    /// Set while the merchant has disconnected the shop
    pub disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.disconnected_at.is_none()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("webhook_ids", &self.webhook_ids)
            .field("voice_settings", &self.voice_settings)
            .field("disconnected_at", &self.disconnected_at)
            .finish_non_exhaustive()
    }
}

/// Data written when an install completes. Re-installing the same shop
/// reconnects the existing row: credentials and webhooks are replaced, the
/// id and voice settings are kept.
#[derive(Clone)]
pub struct NewStore {
    pub shop_domain: ShopDomain,
    pub access_token: SecretString,
    pub webhook_secret: Option<SecretString>,
    pub webhook_ids: Vec<i64>,
}

/// What API callers may see of a store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreView {
    pub id: StoreId,
    pub shopify_domain: ShopDomain,
    pub voice_settings: VoiceSettings,
    pub webhook_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Store> for StoreView {
    fn from(store: &Store) -> Self {
        Self {
            id: store.id,
            shopify_domain: store.shop_domain.clone(),
            voice_settings: store.voice_settings.clone(),
            webhook_count: store.webhook_ids.len(),
            created_at: store.created_at,
            updated_at: store.updated_at,
        }
    }
}
