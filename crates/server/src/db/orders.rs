//! `PostgreSQL` order store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use voice_confirm_core::{
    CallHistoryEntry, CallStatus, OrderId, OrderStatus, PhoneNumber, StoreId,
};

use super::{OrderStore, RepositoryError, map_unique_violation};
use crate::models::{NewOrder, Order, OrderFilter, OrderUpdate, Page};

const ORDER_COLUMNS: &str = "id, store_id, shopify_order_id, order_number, customer_name, \
     customer_phone, amount, status, call_status, call_sid, created_at, updated_at, \
     last_call_at, call_history";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    store_id: Option<StoreId>,
    shopify_order_id: String,
    order_number: String,
    customer_name: String,
    customer_phone: PhoneNumber,
    amount: Decimal,
    status: OrderStatus,
    call_status: CallStatus,
    call_sid: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_call_at: Option<DateTime<Utc>>,
    call_history: Json<Vec<CallHistoryEntry>>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            shopify_order_id: row.shopify_order_id,
            order_number: row.order_number,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            amount: row.amount,
            status: row.status,
            call_status: row.call_status,
            call_sid: row.call_sid,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_call_at: row.last_call_at,
            call_history: row.call_history.0,
        }
    }
}

/// Order store backed by `voice.orders`.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1::BIGINT FROM voice.orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM voice.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn get_by_external_id(
        &self,
        store_id: StoreId,
        shopify_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM voice.orders \
             WHERE store_id = $1 AND shopify_order_id = $2"
        ))
        .bind(store_id)
        .bind(shopify_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM voice.orders WHERE order_number = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn get_by_call_sid(&self, call_sid: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM voice.orders WHERE call_sid = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn list(&self, filter: OrderFilter, page: Page) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM voice.orders \
             WHERE ($1::BIGINT IS NULL OR store_id = $1) \
               AND ($2::voice.order_status IS NULL OR status = $2) \
               AND ($3::voice.call_status IS NULL OR call_status = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.store_id)
        .bind(filter.status)
        .bind(filter.call_status)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO voice.orders \
               (store_id, shopify_order_id, order_number, customer_name, customer_phone, amount) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.store_id)
        .bind(&order.shopify_order_id)
        .bind(&order.order_number)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(order.amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "order already exists"))?;
        Ok(row.into())
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, RepositoryError> {
        let history = update.append_history.map(|entry| Json(vec![entry]));
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE voice.orders SET \
               status = COALESCE($2, status), \
               call_status = COALESCE($3, call_status), \
               last_call_at = COALESCE($4, last_call_at), \
               call_sid = COALESCE($5, call_sid), \
               call_history = call_history || COALESCE($6::JSONB, '[]'::JSONB), \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.status)
        .bind(update.call_status)
        .bind(update.last_call_at)
        .bind(update.call_sid)
        .bind(history)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::from).ok_or(RepositoryError::NotFound)
    }

    async fn try_begin_call(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE voice.orders SET call_status = 'calling', call_sid = NULL, updated_at = now() \
             WHERE id = $1 AND call_status <> 'calling' \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None if self.exists(id).await? => {
                Err(RepositoryError::Conflict("call already in progress".to_string()))
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn finish_call(
        &self,
        id: OrderId,
        call_sid: &str,
        call_status: CallStatus,
        entry: CallHistoryEntry,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE voice.orders SET \
               call_status = $3, \
               status = CASE WHEN $3 = 'completed' AND status = 'pending' \
                             THEN 'called'::voice.order_status ELSE status END, \
               call_history = call_history || $4::JSONB, \
               updated_at = now() \
             WHERE id = $1 AND call_sid = $2 AND call_status = 'calling' \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(call_sid)
        .bind(call_status)
        .bind(Json(vec![entry]))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
