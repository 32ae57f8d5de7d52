//! Order endpoints for the dashboard.
//!
//! Every handler resolves the caller's store first; orders of other stores
//! are indistinguishable from missing ones.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use voice_confirm_core::{CallStatus, OrderId, OrderStatus, PhoneNumber, StatusParseError};

use super::{current_store, owned_order};
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{NewOrder, Order, OrderFilter, Page};
use crate::services::telephony::{CallPlacement, ProviderCallStatus};
use crate::state::AppState;

const MAX_PAGE_SIZE: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/call", post(call_order))
        .route("/orders/{id}/status", put(update_status))
        .route("/orders/{id}/call-status", get(call_status))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub call_status: Option<String>,
}

impl ListQuery {
    fn page(&self) -> Result<Page> {
        let defaults = Page::default();
        let limit = self.limit.unwrap_or(defaults.limit);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Page {
            offset: self.skip.unwrap_or(defaults.offset),
            limit,
        })
    }
}

fn parse_filter<T: std::str::FromStr>(value: Option<&str>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .filter(|v| !v.is_empty())
        .map(str::parse)
        .transpose()
        .map_err(|e: T::Err| AppError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shopify_order_id: String,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub message: &'static str,
    pub order: Order,
    pub call: CallPlacement,
}

#[instrument(skip_all)]
async fn list_orders(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>> {
    let store = current_store(&state, &user).await?;
    let filter = OrderFilter {
        store_id: Some(store.id),
        status: parse_filter::<OrderStatus>(query.status.as_deref())?,
        call_status: parse_filter::<CallStatus>(query.call_status.as_deref())?,
    };
    let orders = state.repos().orders.list(filter, query.page()?).await?;
    Ok(Json(orders))
}

#[instrument(skip_all)]
async fn create_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let store = current_store(&state, &user).await?;

    let customer_phone = PhoneNumber::parse_with_country_code(
        &body.customer_phone,
        state.config().default_country_code.as_deref(),
    )
    .map_err(|e| AppError::BadRequest(format!("Invalid phone number: {e}")))?;

    for (field, value) in [
        ("shopifyOrderId", &body.shopify_order_id),
        ("orderNumber", &body.order_number),
        ("customerName", &body.customer_name),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} must not be empty")));
        }
    }
    if body.amount.is_sign_negative() {
        return Err(AppError::BadRequest("amount must not be negative".to_string()));
    }

    let ingested = state
        .workflow()
        .ingest(NewOrder {
            store_id: store.id,
            shopify_order_id: body.shopify_order_id.trim().to_string(),
            order_number: body.order_number.trim().to_string(),
            customer_name: body.customer_name.trim().to_string(),
            customer_phone,
            amount: body.amount,
        })
        .await?;

    let status = if ingested.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ingested.order)))
}

async fn get_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i64>,
) -> Result<Json<Order>> {
    Ok(Json(owned_order(&state, &user, OrderId::new(id)).await?))
}

#[instrument(skip_all, fields(order_id = id))]
async fn call_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i64>,
) -> Result<Json<CallResponse>> {
    let order = owned_order(&state, &user, OrderId::new(id)).await?;
    let attempt = state.workflow().initiate_call(order.id).await?;
    Ok(Json(CallResponse {
        message: "Call initiated",
        order: attempt.order,
        call: attempt.placement,
    }))
}

#[instrument(skip_all, fields(order_id = id))]
async fn update_status(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i64>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<Order>> {
    let status: OrderStatus = body
        .status
        .parse()
        .map_err(|e: StatusParseError| AppError::BadRequest(e.to_string()))?;
    let order = owned_order(&state, &user, OrderId::new(id)).await?;
    let order = state.workflow().override_status(order.id, status).await?;
    Ok(Json(order))
}

async fn call_status(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i64>,
) -> Result<Json<ProviderCallStatus>> {
    let order = owned_order(&state, &user, OrderId::new(id)).await?;
    Ok(Json(state.workflow().call_status(&order).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query(skip: Option<u32>, limit: Option<u32>) -> ListQuery {
        ListQuery {
            skip,
            limit,
            status: None,
            call_status: None,
        }
    }

    #[test]
    fn test_page_defaults_and_bounds() {
        assert_eq!(query(None, None).page().unwrap(), Page::default());
        assert_eq!(
            query(Some(20), Some(100)).page().unwrap(),
            Page {
                offset: 20,
                limit: 100
            }
        );
        assert!(query(None, Some(0)).page().is_err());
        assert!(query(None, Some(101)).page().is_err());
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(
            parse_filter::<OrderStatus>(Some("confirmed")).unwrap(),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(parse_filter::<OrderStatus>(Some("")).unwrap(), None);
        assert_eq!(parse_filter::<CallStatus>(None).unwrap(), None);
        assert!(parse_filter::<CallStatus>(Some("dialing")).is_err());
    }
}
