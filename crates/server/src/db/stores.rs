//! `PostgreSQL` store repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::types::Json;

use voice_confirm_core::{ShopDomain, StoreId, VoiceSettings};

use super::{RepositoryError, StoreRepository};
use crate::models::{NewStore, Store};

const STORE_COLUMNS: &str = "id, shop_domain, access_token, webhook_secret, webhook_ids, \
     voice_settings, disconnected_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: StoreId,
    shop_domain: ShopDomain,
    access_token: String,
    webhook_secret: Option<String>,
    webhook_ids: Vec<i64>,
    voice_settings: Json<VoiceSettings>,
    disconnected_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            shop_domain: row.shop_domain,
            access_token: SecretString::from(row.access_token),
            webhook_secret: row.webhook_secret.map(SecretString::from),
            webhook_ids: row.webhook_ids,
            voice_settings: row.voice_settings.0,
            disconnected_at: row.disconnected_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Store repository backed by `voice.stores`.
#[derive(Clone)]
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM voice.stores WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Store::from))
    }

    async fn get_by_domain(&self, shop: &ShopDomain) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM voice.stores WHERE shop_domain = $1"
        ))
        .bind(shop)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Store::from))
    }

    async fn upsert(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "INSERT INTO voice.stores (shop_domain, access_token, webhook_secret, webhook_ids) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (shop_domain) DO UPDATE SET \
               access_token = EXCLUDED.access_token, \
               webhook_secret = EXCLUDED.webhook_secret, \
               webhook_ids = EXCLUDED.webhook_ids, \
               disconnected_at = NULL, \
               updated_at = now() \
             RETURNING {STORE_COLUMNS}"
        ))
        .bind(&store.shop_domain)
        .bind(store.access_token.expose_secret())
        .bind(store.webhook_secret.as_ref().map(|s| s.expose_secret()))
        .bind(&store.webhook_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_voice_settings(
        &self,
        id: StoreId,
        settings: &VoiceSettings,
    ) -> Result<Store, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "UPDATE voice.stores SET voice_settings = $2, updated_at = now() \
             WHERE id = $1 RETURNING {STORE_COLUMNS}"
        ))
        .bind(id)
        .bind(Json(settings))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Store::from).ok_or(RepositoryError::NotFound)
    }

    async fn disconnect(&self, id: StoreId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE voice.stores SET \
               access_token = '', \
               webhook_secret = NULL, \
               webhook_ids = '{}', \
               disconnected_at = now(), \
               updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("UPDATE voice.users SET store_id = NULL, updated_at = now() WHERE store_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
