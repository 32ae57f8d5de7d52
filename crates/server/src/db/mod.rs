//! Persistence for orders, stores, users and the redial queue.
//!
//! # Database: schema `voice`
//!
//! ## Tables
//!
//! - `stores` - Connected shops, Admin API tokens, voice settings (JSONB)
//! - `users` - Merchant logins (Argon2 hashes), optional store link
//! - `orders` - Orders with status, call status and `call_history` (JSONB array)
//! - `call_retries` - Durable redial tasks, one per order
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p voice-confirm-cli -- migrate
//! ```
//!
//! Each table is reached through a trait so the workflow can run against
//! `PostgreSQL` in production and [`MemoryStore`] in tests.

pub mod memory;
pub mod orders;
pub mod retries;
pub mod stores;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use voice_confirm_core::{
    CallHistoryEntry, CallStatus, Email, OrderId, ShopDomain, StoreId, UserId, VoiceSettings,
};

use crate::models::{
    NewOrder, NewStore, Order, OrderFilter, OrderUpdate, Page, Store, User, UserCredentials,
};

pub use memory::MemoryStore;
pub use orders::PgOrderStore;
pub use retries::PgRetryQueue;
pub use stores::PgStoreRepository;
pub use users::PgUserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or failed compare-and-set.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique-constraint violation to `Conflict`, anything else to
/// `Database`.
pub(crate) fn map_unique_violation(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_string());
    }
    RepositoryError::Database(err)
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Look up by Shopify order id within a store.
    async fn get_by_external_id(
        &self,
        store_id: StoreId,
        shopify_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Newest order carrying this order number.
    async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError>;

    /// The order whose current call is `call_sid`.
    async fn get_by_call_sid(&self, call_sid: &str) -> Result<Option<Order>, RepositoryError>;

    /// Orders matching `filter`, newest first.
    async fn list(&self, filter: OrderFilter, page: Page) -> Result<Vec<Order>, RepositoryError>;

    /// # Errors
    ///
    /// `Conflict` if the store already has an order with this Shopify id.
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// # Errors
    ///
    /// `NotFound` if the order does not exist.
    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, RepositoryError>;

    /// Atomically move `call_status` to `calling` unless it already is.
    ///
    /// Clears `call_sid`, so outcomes of the previous call no longer match.
    ///
    /// # Errors
    ///
    /// `Conflict` if a call is already in flight, `NotFound` if the order
    /// does not exist.
    async fn try_begin_call(&self, id: OrderId) -> Result<Order, RepositoryError>;

    /// Record the outcome of the in-flight call `call_sid`.
    ///
    /// Applies only while the order is still `calling` on that same call;
    /// returns `None` for a stale or duplicate outcome.
    async fn finish_call(
        &self,
        id: OrderId,
        call_sid: &str,
        call_status: CallStatus,
        entry: CallHistoryEntry,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Store persistence.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    async fn get_by_domain(&self, shop: &ShopDomain) -> Result<Option<Store>, RepositoryError>;

    /// Insert, or replace credentials of an existing store for the same shop.
    async fn upsert(&self, store: NewStore) -> Result<Store, RepositoryError>;

    async fn update_voice_settings(
        &self,
        id: StoreId,
        settings: &VoiceSettings,
    ) -> Result<Store, RepositoryError>;

    /// Mark the store disconnected, drop its credentials and unlink its
    /// users. The row and its orders stay, so reconnecting the same shop
    /// gets the same id back.
    async fn disconnect(&self, id: StoreId) -> Result<(), RepositoryError>;
}

/// Field-level replacement of user fields.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<Email>,
    pub password_hash: Option<String>,
}

/// User persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError>;

    /// # Errors
    ///
    /// `Conflict` if the email is taken.
    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError>;

    async fn update(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError>;

    async fn set_store(&self, id: UserId, store_id: Option<StoreId>)
    -> Result<User, RepositoryError>;
}

/// Durable delayed redial tasks, at most one per order.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Schedule (or reschedule) a redial of `order_id` at `due_at`.
    async fn schedule(&self, order_id: OrderId, due_at: DateTime<Utc>)
    -> Result<(), RepositoryError>;

    /// Remove and return up to `limit` tasks due at or before `now`.
    ///
    /// A task is handed to exactly one caller even when several workers
    /// poll concurrently.
    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OrderId>, RepositoryError>;

    /// Drop the pending task for `order_id`; returns whether one existed.
    async fn cancel(&self, order_id: OrderId) -> Result<bool, RepositoryError>;
}

/// The repository handles the application runs against.
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderStore>,
    pub stores: Arc<dyn StoreRepository>,
    pub users: Arc<dyn UserRepository>,
    pub retries: Arc<dyn RetryQueue>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            stores: Arc::new(PgStoreRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            retries: Arc::new(PgRetryQueue::new(pool.clone())),
        }
    }

    /// Process-local repositories backed by one [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            orders: store.clone(),
            stores: store.clone(),
            users: store.clone(),
            retries: store,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
