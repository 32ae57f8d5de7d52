//! Shopify REST payloads.
//!
//! Webhook bodies for `orders/*` topics and `GET /orders/{id}.json` share
//! the same order shape, so one type serves both.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// An order as Shopify sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    pub id: i64,
    /// Sequential shop-facing number, e.g. `1001`
    #[serde(default)]
    pub order_number: Option<i64>,
    /// Display name, e.g. `#1001`
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl OrderPayload {
    /// The order number customers see, without the leading `#`.
    #[must_use]
    pub fn order_number(&self) -> String {
        if let Some(number) = self.order_number {
            return number.to_string();
        }
        non_blank(self.name.as_ref()).map_or_else(
            || self.id.to_string(),
            |name| name.trim_start_matches('#').to_string(),
        )
    }

    /// First usable phone: order, customer, shipping, then billing.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.phone.as_ref())
            .or_else(|| non_blank(self.customer.as_ref().and_then(|c| c.phone.as_ref())))
            .or_else(|| {
                non_blank(self.shipping_address.as_ref().and_then(|a| a.phone.as_ref()))
            })
            .or_else(|| non_blank(self.billing_address.as_ref().and_then(|a| a.phone.as_ref())))
    }

    #[must_use]
    pub fn customer_name(&self) -> String {
        let from_customer = self.customer.as_ref().map(|c| {
            [c.first_name.as_deref(), c.last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        });
        from_customer
            .filter(|name| !name.is_empty())
            .or_else(|| {
                non_blank(self.shipping_address.as_ref().and_then(|a| a.name.as_ref()))
                    .map(String::from)
            })
            .unwrap_or_else(|| "Customer".to_string())
    }

    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.total_price.unwrap_or_default()
    }
}

/// Shop details returned by `GET /shop.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
    pub myshopify_domain: String,
}

/// `{"order": {...}}`
#[derive(Debug, Deserialize)]
pub(super) struct OrderEnvelope {
    pub order: OrderPayload,
}

/// `{"shop": {...}}`
#[derive(Debug, Deserialize)]
pub(super) struct ShopEnvelope {
    pub shop: ShopInfo,
}

#[derive(Debug, Deserialize)]
pub(super) struct WebhookCreated {
    pub id: i64,
}

/// `{"webhook": {...}}`
#[derive(Debug, Deserialize)]
pub(super) struct WebhookEnvelope {
    pub webhook: WebhookCreated,
}

#[derive(Debug, Deserialize)]
pub(super) struct AccessTokenResponse {
    pub access_token: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_fields() {
        let payload: OrderPayload = serde_json::from_str(
            r##"{
                "id": 820982911946154508,
                "order_number": 1001,
                "name": "#1001",
                "phone": null,
                "total_price": "2499.00",
                "customer": {"first_name": "Ayesha", "last_name": "Khan", "phone": "+923001234567"},
                "shipping_address": {"name": "A. Khan", "phone": "+923009999999"}
            }"##,
        )
        .unwrap();

        assert_eq!(payload.order_number(), "1001");
        assert_eq!(payload.phone(), Some("+923001234567"));
        assert_eq!(payload.customer_name(), "Ayesha Khan");
        assert_eq!(payload.amount(), Decimal::new(249_900, 2));
    }

    #[test]
    fn test_fallbacks() {
        let payload: OrderPayload = serde_json::from_str(
            r##"{"id": 5, "name": "#A-7", "phone": "  ", "shipping_address": {"phone": "0300 1234567"}}"##,
        )
        .unwrap();

        assert_eq!(payload.order_number(), "A-7");
        assert_eq!(payload.phone(), Some("0300 1234567"));
        assert_eq!(payload.customer_name(), "Customer");
        assert_eq!(payload.amount(), Decimal::ZERO);
    }

    #[test]
    fn test_no_phone_anywhere() {
        let payload: OrderPayload = serde_json::from_str(r#"{"id": 5}"#).unwrap();
        assert_eq!(payload.phone(), None);
        assert_eq!(payload.order_number(), "5");
    }
}
