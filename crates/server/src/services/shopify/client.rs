//! Shopify Admin REST client.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use voice_confirm_core::ShopDomain;

use super::types::{
    AccessTokenResponse, OrderEnvelope, ShopEnvelope, WebhookEnvelope,
};
use super::{CommercePlatform, OrderPayload, ShopInfo, ShopifyError};
use crate::config::ShopifyAppConfig;
use crate::models::Store;

/// Stateless Admin API client holding only the app credentials.
///
/// Cheap to clone; the inner `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct ShopifyClient {
    http: reqwest::Client,
    api_key: String,
    api_secret: SecretString,
    api_version: String,
}

impl ShopifyClient {
    #[must_use]
    pub fn new(config: &ShopifyAppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_version: config.api_version.clone(),
        }
    }

    fn admin_url(&self, shop: &ShopDomain, path: &str) -> String {
        format!("https://{shop}/admin/api/{}/{path}", self.api_version)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        shop: &ShopDomain,
        access_token: &SecretString,
        path: &str,
    ) -> Result<T, ShopifyError> {
        let response = self
            .http
            .get(self.admin_url(shop, path))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response, path).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Map non-success responses to [`ShopifyError`].
async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ShopifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(ShopifyError::NotFound(what.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ShopifyError::Unauthorized(
            format!("access token rejected for {what}"),
        )),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(ShopifyError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl CommercePlatform for ShopifyClient {
    #[instrument(skip(self, code), fields(shop = %shop))]
    async fn exchange_code(
        &self,
        shop: &ShopDomain,
        code: &str,
    ) -> Result<SecretString, ShopifyError> {
        let url = format!("https://{shop}/admin/oauth/access_token");

        let params = [
            ("client_id", self.api_key.as_str()),
            ("client_secret", self.api_secret.expose_secret()),
            ("code", code),
        ];

        let response = self.http.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ShopifyError::OAuth(format!("Token exchange failed: {text}")));
        }

        let token: AccessTokenResponse = response.json().await?;
        debug!("Access token obtained");
        Ok(SecretString::from(token.access_token))
    }

    #[instrument(skip(self, store), fields(shop = %store.shop_domain))]
    async fn fetch_order(
        &self,
        store: &Store,
        order_id: &str,
    ) -> Result<OrderPayload, ShopifyError> {
        let path = format!("orders/{}.json", urlencoding::encode(order_id));
        let envelope: OrderEnvelope = self
            .get_json(&store.shop_domain, &store.access_token, &path)
            .await?;
        Ok(envelope.order)
    }

    #[instrument(skip(self, store), fields(shop = %store.shop_domain))]
    async fn fetch_shop(&self, store: &Store) -> Result<ShopInfo, ShopifyError> {
        let envelope: ShopEnvelope = self
            .get_json(&store.shop_domain, &store.access_token, "shop.json")
            .await?;
        Ok(envelope.shop)
    }

    #[instrument(skip(self, access_token), fields(shop = %shop))]
    async fn register_webhook(
        &self,
        shop: &ShopDomain,
        access_token: &SecretString,
        topic: &str,
        address: &str,
    ) -> Result<i64, ShopifyError> {
        let body = json!({
            "webhook": {
                "topic": topic,
                "address": address,
                "format": "json",
            }
        });

        let response = self
            .http
            .post(self.admin_url(shop, "webhooks.json"))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, "webhooks.json").await?;
        let created: WebhookEnvelope = serde_json::from_str(&response.text().await?)?;

        debug!(webhook_id = created.webhook.id, "Webhook registered");
        Ok(created.webhook.id)
    }

    #[instrument(skip(self, store), fields(shop = %store.shop_domain))]
    async fn deregister_webhook(
        &self,
        store: &Store,
        webhook_id: i64,
    ) -> Result<bool, ShopifyError> {
        let path = format!("webhooks/{webhook_id}.json");
        let response = self
            .http
            .delete(self.admin_url(&store.shop_domain, &path))
            .header("X-Shopify-Access-Token", store.access_token.expose_secret())
            .send()
            .await?;

        match check_status(response, &path).await {
            Ok(_) => Ok(true),
            Err(ShopifyError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_url_uses_api_version() {
        let client = ShopifyClient::new(&ShopifyAppConfig {
            api_key: "key".to_string(),
            api_secret: SecretString::from("secret"),
            api_version: "2024-01".to_string(),
            scopes: Vec::new(),
        });
        let shop = ShopDomain::parse("acme").unwrap();
        assert_eq!(
            client.admin_url(&shop, "orders/1.json"),
            "https://acme.myshopify.com/admin/api/2024-01/orders/1.json"
        );
    }
}
