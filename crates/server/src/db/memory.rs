//! In-memory backend for every repository trait.
//!
//! Used by the test suites and for running the server without a database.
//! A single `tokio` mutex guards all tables, so each trait method is atomic
//! just like the single-statement `PostgreSQL` queries it stands in for.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;

use voice_confirm_core::{
    CallHistoryEntry, CallStatus, Email, OrderId, OrderStatus, ShopDomain, StoreId, UserId,
    VoiceSettings,
};

use super::{OrderStore, RepositoryError, RetryQueue, StoreRepository, UserRepository, UserUpdate};
use crate::models::{
    NewOrder, NewStore, Order, OrderFilter, OrderUpdate, Page, Store, User, UserCredentials,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    orders: BTreeMap<OrderId, Order>,
    stores: BTreeMap<StoreId, Store>,
    users: BTreeMap<UserId, UserCredentials>,
    retries: HashMap<OrderId, DateTime<Utc>>,
}

impl Tables {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local storage implementing all repository traits.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Due time of the pending redial for `order_id`, if any.
    pub async fn retry_due_at(&self, order_id: OrderId) -> Option<DateTime<Utc>> {
        self.tables.lock().await.retries.get(&order_id).copied()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn get_by_external_id(
        &self,
        store_id: StoreId,
        shopify_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .orders
            .values()
            .find(|o| o.store_id == Some(store_id) && o.shopify_order_id == shopify_order_id)
            .cloned())
    }

    async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .orders
            .values()
            .filter(|o| o.order_number == order_number)
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn get_by_call_sid(&self, call_sid: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .orders
            .values()
            .filter(|o| o.call_sid.as_deref() == Some(call_sid))
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn list(&self, filter: OrderFilter, page: Page) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.orders.values().any(|o| {
            o.store_id == Some(order.store_id) && o.shopify_order_id == order.shopify_order_id
        });
        if duplicate {
            return Err(RepositoryError::Conflict("order already exists".to_string()));
        }

        let now = Utc::now();
        let id = OrderId::new(tables.next_id());
        let created = Order {
            id,
            store_id: Some(order.store_id),
            shopify_order_id: order.shopify_order_id,
            order_number: order.order_number,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            amount: order.amount,
            status: OrderStatus::Pending,
            call_status: CallStatus::NotCalled,
            call_sid: None,
            created_at: now,
            updated_at: now,
            last_call_at: None,
            call_history: Vec::new(),
        };
        tables.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(call_status) = update.call_status {
            order.call_status = call_status;
        }
        if let Some(at) = update.last_call_at {
            order.last_call_at = Some(at);
        }
        if let Some(sid) = update.call_sid {
            order.call_sid = Some(sid);
        }
        if let Some(entry) = update.append_history {
            order.call_history.push(entry);
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn try_begin_call(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.call_status == CallStatus::Calling {
            return Err(RepositoryError::Conflict(
                "call already in progress".to_string(),
            ));
        }
        order.call_status = CallStatus::Calling;
        order.call_sid = None;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn finish_call(
        &self,
        id: OrderId,
        call_sid: &str,
        call_status: CallStatus,
        entry: CallHistoryEntry,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.call_status != CallStatus::Calling || order.call_sid.as_deref() != Some(call_sid)
        {
            return Ok(None);
        }

        order.call_status = call_status;
        if call_status == CallStatus::Completed && order.status == OrderStatus::Pending {
            order.status = OrderStatus::Called;
        }
        order.call_history.push(entry);
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for MemoryStore {
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.tables.lock().await.stores.get(&id).cloned())
    }

    async fn get_by_domain(&self, shop: &ShopDomain) -> Result<Option<Store>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .stores
            .values()
            .find(|s| &s.shop_domain == shop)
            .cloned())
    }

    async fn upsert(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        if let Some(existing) = tables
            .stores
            .values_mut()
            .find(|s| s.shop_domain == store.shop_domain)
        {
            existing.access_token = store.access_token;
            existing.webhook_secret = store.webhook_secret;
            existing.webhook_ids = store.webhook_ids;
            existing.disconnected_at = None;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = StoreId::new(tables.next_id());
        let created = Store {
            id,
            shop_domain: store.shop_domain,
            access_token: store.access_token,
            webhook_secret: store.webhook_secret,
            webhook_ids: store.webhook_ids,
            voice_settings: VoiceSettings::default(),
            disconnected_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.stores.insert(id, created.clone());
        Ok(created)
    }

    async fn update_voice_settings(
        &self,
        id: StoreId,
        settings: &VoiceSettings,
    ) -> Result<Store, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let store = tables.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        store.voice_settings = settings.clone();
        store.updated_at = Utc::now();
        Ok(store.clone())
    }

    async fn disconnect(&self, id: StoreId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let store = tables.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();
        store.access_token = SecretString::from(String::new());
        store.webhook_secret = None;
        store.webhook_ids.clear();
        store.disconnected_at = Some(now);
        store.updated_at = now;

        for credentials in tables.users.values_mut() {
            if credentials.user.store_id == Some(id) {
                credentials.user.store_id = None;
                credentials.user.updated_at = now;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .get(&id)
            .map(|c| c.user.clone()))
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|c| &c.user.email == email)
            .cloned())
    }

    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|c| &c.user.email == email) {
            return Err(RepositoryError::Conflict(
                "email already registered".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(tables.next_id()),
            email: email.clone(),
            store_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn update(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if let Some(email) = &update.email
            && tables
                .users
                .values()
                .any(|c| c.user.id != id && &c.user.email == email)
        {
            return Err(RepositoryError::Conflict(
                "email already registered".to_string(),
            ));
        }

        let credentials = tables.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(email) = update.email {
            credentials.user.email = email;
        }
        if let Some(hash) = update.password_hash {
            credentials.password_hash = hash;
        }
        credentials.user.updated_at = Utc::now();
        Ok(credentials.user.clone())
    }

    async fn set_store(
        &self,
        id: UserId,
        store_id: Option<StoreId>,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let credentials = tables.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        credentials.user.store_id = store_id;
        credentials.user.updated_at = Utc::now();
        Ok(credentials.user.clone())
    }
}

#[async_trait]
impl RetryQueue for MemoryStore {
    async fn schedule(
        &self,
        order_id: OrderId,
        due_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.tables.lock().await.retries.insert(order_id, due_at);
        Ok(())
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OrderId>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let mut due: Vec<(DateTime<Utc>, OrderId)> = tables
            .retries
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();
        due.truncate(limit as usize);

        for (_, id) in &due {
            tables.retries.remove(id);
        }
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn cancel(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        Ok(self.tables.lock().await.retries.remove(&order_id).is_some())
    }
}

/// Shorthand for tests seeding a store without going through OAuth.
#[must_use]
pub fn new_store(shop: ShopDomain, access_token: &str) -> NewStore {
    NewStore {
        shop_domain: shop,
        access_token: SecretString::from(access_token.to_string()),
        webhook_secret: None,
        webhook_ids: Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use voice_confirm_core::PhoneNumber;

    use super::*;

    async fn seeded() -> (MemoryStore, StoreId) {
        let memory = MemoryStore::default();
        let store = StoreRepository::upsert(
            &memory,
            new_store(ShopDomain::parse("acme").unwrap(), "shpat_1"),
        )
        .await
        .unwrap();
        (memory, store.id)
    }

    fn new_order(store_id: StoreId, external: &str, number: &str) -> NewOrder {
        NewOrder {
            store_id,
            shopify_order_id: external.to_string(),
            order_number: number.to_string(),
            customer_name: "Ayesha Khan".to_string(),
            customer_phone: PhoneNumber::parse("+923001234567").unwrap(),
            amount: Decimal::new(249_900, 2),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_external_id() {
        let (memory, store_id) = seeded().await;
        OrderStore::create(&memory, new_order(store_id, "S-1", "1001"))
            .await
            .unwrap();
        let err = OrderStore::create(&memory, new_order(store_id, "S-1", "1001"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_replaces_only_given_fields() {
        let (memory, store_id) = seeded().await;
        let order = OrderStore::create(&memory, new_order(store_id, "S-1", "1001"))
            .await
            .unwrap();

        OrderStore::update(&memory, order.id, OrderUpdate::status(OrderStatus::Cancelled))
            .await
            .unwrap();
        let fetched = OrderStore::get(&memory, order.id).await.unwrap().unwrap();

        assert_eq!(fetched.status, OrderStatus::Cancelled);
        assert_eq!(fetched.call_status, CallStatus::NotCalled);
        assert_eq!(fetched.customer_name, order.customer_name);
        assert_eq!(fetched.amount, order.amount);
        assert!(fetched.call_history.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let memory = MemoryStore::default();
        let err = OrderStore::update(&memory, OrderId::new(99), OrderUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_try_begin_call_is_compare_and_set() {
        let (memory, store_id) = seeded().await;
        let order = OrderStore::create(&memory, new_order(store_id, "S-1", "1001"))
            .await
            .unwrap();

        let first = memory.try_begin_call(order.id).await.unwrap();
        assert_eq!(first.call_status, CallStatus::Calling);
        assert!(matches!(
            memory.try_begin_call(order.id).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            memory.try_begin_call(OrderId::new(404)).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let (memory, store_id) = seeded().await;
        for (i, number) in ["1001", "1002", "1003"].iter().enumerate() {
            OrderStore::create(&memory, new_order(store_id, &format!("S-{i}"), number))
                .await
                .unwrap();
        }
        let newest = OrderStore::get_by_number(&memory, "1003")
            .await
            .unwrap()
            .unwrap();
        OrderStore::update(&memory, newest.id, OrderUpdate::status(OrderStatus::Confirmed))
            .await
            .unwrap();

        let all = memory
            .list(OrderFilter::default(), Page::default())
            .await
            .unwrap();
        let numbers: Vec<_> = all.iter().map(|o| o.order_number.as_str()).collect();
        assert_eq!(numbers, ["1003", "1002", "1001"]);

        let confirmed = memory
            .list(
                OrderFilter {
                    status: Some(OrderStatus::Confirmed),
                    ..OrderFilter::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(confirmed.len(), 1);

        let second_page = memory
            .list(OrderFilter::default(), Page { offset: 1, limit: 1 })
            .await
            .unwrap();
        assert_eq!(second_page[0].order_number, "1002");
    }

    #[tokio::test]
    async fn test_take_due_hands_out_each_task_once() {
        let memory = MemoryStore::default();
        let now = Utc::now();
        memory
            .schedule(OrderId::new(1), now - chrono::Duration::seconds(5))
            .await
            .unwrap();
        memory
            .schedule(OrderId::new(2), now + chrono::Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(memory.take_due(now, 10).await.unwrap(), vec![OrderId::new(1)]);
        assert!(memory.take_due(now, 10).await.unwrap().is_empty());
        assert!(memory.cancel(OrderId::new(2)).await.unwrap());
        assert!(!memory.cancel(OrderId::new(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_try_begin_call_forgets_previous_call() {
        let (memory, store_id) = seeded().await;
        let order = OrderStore::create(&memory, new_order(store_id, "S-1", "1001"))
            .await
            .unwrap();
        memory.try_begin_call(order.id).await.unwrap();
        OrderStore::update(
            &memory,
            order.id,
            OrderUpdate {
                call_status: Some(CallStatus::Completed),
                call_sid: Some("CA1".to_string()),
                ..OrderUpdate::default()
            },
        )
        .await
        .unwrap();
        assert!(memory.get_by_call_sid("CA1").await.unwrap().is_some());

        let redial = memory.try_begin_call(order.id).await.unwrap();
        assert_eq!(redial.call_sid, None);
        assert!(memory.get_by_call_sid("CA1").await.unwrap().is_none());

        let entry = CallHistoryEntry::new(Utc::now(), CallStatus::Completed);
        let stale = memory
            .finish_call(order.id, "CA1", CallStatus::Completed, entry)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_store_row_and_orders() {
        let (memory, store_id) = seeded().await;
        let order = OrderStore::create(&memory, new_order(store_id, "S-1", "1001"))
            .await
            .unwrap();
        StoreRepository::disconnect(&memory, store_id).await.unwrap();

        let kept = OrderStore::get(&memory, order.id).await.unwrap().unwrap();
        assert_eq!(kept.store_id, Some(store_id));
        let store = StoreRepository::get(&memory, store_id).await.unwrap().unwrap();
        assert!(!store.is_connected());
        assert!(store.webhook_ids.is_empty());

        let again = StoreRepository::upsert(
            &memory,
            new_store(ShopDomain::parse("acme").unwrap(), "shpat_2"),
        )
        .await
        .unwrap();
        assert_eq!(again.id, store_id);
        assert!(again.is_connected());
    }
}
