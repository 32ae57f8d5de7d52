//! Shopify order webhook handling.
//!
//! Runs after the signature check. Nothing in here fails the request:
//! Shopify redelivers on any non-2xx, so processing problems are logged and
//! reported back only as an [`Outcome`].

use serde::Deserialize;
use tracing::{info, instrument, warn};

use voice_confirm_core::{CallStatus, OrderStatus, PhoneNumber};

use crate::models::{NewOrder, Order, Store};
use crate::services::shopify::OrderPayload;
use crate::state::AppState;

/// What a delivery amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New order stored (and dialed).
    Created,
    /// Order already known; dialed only if it never was.
    Duplicate,
    /// Order marked cancelled.
    Cancelled,
    /// Valid delivery we chose not to act on.
    Skipped,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Duplicate => "duplicate",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderRef {
    id: i64,
}

/// Dispatch a verified delivery by topic.
#[instrument(skip(state, store, body), fields(shop = %store.shop_domain))]
pub async fn handle(state: &AppState, store: &Store, topic: &str, body: &[u8]) -> Outcome {
    match topic {
        "orders/create" => order_created(state, store, body).await,
        "orders/cancelled" => order_cancelled(state, store, body).await,
        _ => {
            info!("Ignoring unsubscribed topic");
            Outcome::Skipped
        }
    }
}

async fn order_created(state: &AppState, store: &Store, body: &[u8]) -> Outcome {
    let payload: OrderPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Unparseable order payload");
            return Outcome::Skipped;
        }
    };

    let Some(phone) = customer_phone(state, store, &payload).await else {
        warn!(shopify_order_id = payload.id, "Order has no usable phone number");
        return Outcome::Skipped;
    };

    let new_order = NewOrder {
        store_id: store.id,
        shopify_order_id: payload.id.to_string(),
        order_number: payload.order_number(),
        customer_name: payload.customer_name(),
        customer_phone: phone,
        amount: payload.amount(),
    };

    let workflow = state.workflow();
    let ingested = match workflow.ingest(new_order).await {
        Ok(ingested) => ingested,
        Err(e) => {
            warn!(error = %e, "Failed to store order");
            return Outcome::Skipped;
        }
    };
    let order = &ingested.order;
    if !ingested.created {
        if !never_dialed(order) {
            return Outcome::Duplicate;
        }
        info!(order_id = %order.id, "Dialing order left undialed by an earlier delivery");
    }

    if let Err(e) = workflow.initiate_call(order.id).await {
        warn!(order_id = %order.id, error = %e, "Automatic call not started");
    }
    if ingested.created {
        Outcome::Created
    } else {
        Outcome::Duplicate
    }
}

/// Stored but never dialed, e.g. when the process stopped between the two.
fn never_dialed(order: &Order) -> bool {
    order.status == OrderStatus::Pending
        && order.call_status == CallStatus::NotCalled
        && order.call_history.is_empty()
}

/// Phone from the payload, falling back to a fresh fetch of the order.
async fn customer_phone(
    state: &AppState,
    store: &Store,
    payload: &OrderPayload,
) -> Option<PhoneNumber> {
    let country_code = state.config().default_country_code.as_deref();
    let parse = |raw: &str| match PhoneNumber::parse_with_country_code(raw, country_code) {
        Ok(phone) => Some(phone),
        Err(e) => {
            warn!(error = %e, "Rejected customer phone");
            None
        }
    };

    if let Some(phone) = payload.phone().and_then(parse) {
        return Some(phone);
    }

    match state
        .commerce()
        .fetch_order(store, &payload.id.to_string())
        .await
    {
        Ok(full) => full.phone().and_then(parse),
        Err(e) => {
            warn!(error = %e, "Order lookup failed");
            None
        }
    }
}

async fn order_cancelled(state: &AppState, store: &Store, body: &[u8]) -> Outcome {
    let order: OrderRef = match serde_json::from_slice(body) {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, "Unparseable order payload");
            return Outcome::Skipped;
        }
    };

    match state
        .workflow()
        .cancel_from_platform(store.id, &order.id.to_string())
        .await
    {
        Ok(Some(_)) => Outcome::Cancelled,
        Ok(None) => Outcome::Skipped,
        Err(e) => {
            warn!(error = %e, "Failed to cancel order");
            Outcome::Skipped
        }
    }
}
