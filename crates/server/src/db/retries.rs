//! `PostgreSQL` redial queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use voice_confirm_core::OrderId;

use super::{RepositoryError, RetryQueue};

/// Redial queue backed by `voice.call_retries`.
///
/// Tasks survive restarts; `take_due` deletes with `SKIP LOCKED` so
/// concurrent workers never claim the same task.
#[derive(Clone)]
pub struct PgRetryQueue {
    pool: PgPool,
}

impl PgRetryQueue {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RetryQueue for PgRetryQueue {
    async fn schedule(
        &self,
        order_id: OrderId,
        due_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO voice.call_retries (order_id, due_at) VALUES ($1, $2) \
             ON CONFLICT (order_id) DO UPDATE SET due_at = EXCLUDED.due_at",
        )
        .bind(order_id)
        .bind(due_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OrderId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, OrderId>(
            "DELETE FROM voice.call_retries WHERE order_id IN ( \
               SELECT order_id FROM voice.call_retries \
               WHERE due_at <= $1 \
               ORDER BY due_at \
               LIMIT $2 \
               FOR UPDATE SKIP LOCKED \
             ) RETURNING order_id",
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn cancel(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM voice.call_retries WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
