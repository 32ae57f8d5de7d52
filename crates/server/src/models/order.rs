//! Order records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use voice_confirm_core::{
    CallHistoryEntry, CallStatus, OrderId, OrderStatus, PhoneNumber, StoreId,
};

/// An order awaiting (or past) confirmation.
///
/// `status` and `call_status` move independently; see
/// [`crate::services::calls`] for the transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    /// Owning store; kept across disconnects
    pub store_id: Option<StoreId>,
    pub shopify_order_id: String,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: PhoneNumber,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub status: OrderStatus,
    pub call_status: CallStatus,
    /// Provider id of the most recent call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_call_at: Option<DateTime<Utc>>,
    pub call_history: Vec<CallHistoryEntry>,
}

impl Order {
    /// Number of call attempts that ended in failure.
    #[must_use]
    pub fn failed_attempts(&self) -> usize {
        self.call_history
            .iter()
            .filter(|entry| entry.status == CallStatus::Failed)
            .count()
    }

    #[must_use]
    pub fn is_owned_by(&self, store_id: StoreId) -> bool {
        self.store_id == Some(store_id)
    }
}

/// Data for a new order; status starts at `pending`/`not_called`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub store_id: StoreId,
    pub shopify_order_id: String,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: PhoneNumber,
    pub amount: Decimal,
}

/// Field-level replacement of order fields.
///
/// `None` leaves a field untouched. `append_history` is appended to
/// `callHistory` in the same write.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub call_status: Option<CallStatus>,
    pub last_call_at: Option<DateTime<Utc>>,
    pub call_sid: Option<String>,
    pub append_history: Option<CallHistoryEntry>,
}

impl OrderUpdate {
    #[must_use]
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub store_id: Option<StoreId>,
    pub status: Option<OrderStatus>,
    pub call_status: Option<CallStatus>,
}

impl OrderFilter {
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.store_id.is_none_or(|id| order.store_id == Some(id))
            && self.status.is_none_or(|s| order.status == s)
            && self.call_status.is_none_or(|s| order.call_status == s)
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}
