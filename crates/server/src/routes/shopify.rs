//! Shopify install flow, webhooks and store management.

use std::collections::HashMap;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
    routing::{delete, get, post},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use voice_confirm_core::ShopDomain;

use super::current_store;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{NewStore, Store, StoreView};
use crate::services::shopify::{
    ShopInfo, WEBHOOK_TOPICS,
    oauth::{authorization_url, new_state, verify_callback_hmac},
    webhook::{HMAC_HEADER, SHOP_HEADER, TOPIC_HEADER, verify_signature},
};
use crate::services::webhooks;
use crate::state::{AppState, PendingInstall};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shopify/auth", get(start_install))
        .route("/shopify/callback", get(oauth_callback))
        .route("/shopify/webhook", post(receive_webhook))
        .route("/shopify/store", get(store_info))
        .route("/shopify/disconnect", delete(disconnect))
}

#[derive(Debug, Deserialize)]
pub struct InstallQuery {
    pub shop: String,
}

#[derive(Debug, Serialize)]
pub struct InstallResponse {
    pub auth_url: String,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub store: StoreView,
    /// Live shop details; absent when Shopify could not be reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop: Option<ShopInfo>,
}

fn parse_shop(raw: &str) -> Result<ShopDomain> {
    ShopDomain::parse(raw).map_err(|e| AppError::BadRequest(format!("Invalid shop: {e}")))
}

/// Start an install: hand back the Shopify consent URL.
#[instrument(skip_all)]
async fn start_install(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<InstallQuery>,
) -> Result<Json<InstallResponse>> {
    let shop = parse_shop(&query.shop)?;
    let nonce = new_state();
    let redirect_uri = state.config().api_url("/shopify/callback");
    let auth_url = authorization_url(&state.config().shopify, &shop, &redirect_uri, &nonce);

    info!(shop = %shop, user_id = %user.id, "Starting Shopify install");
    state
        .remember_install(
            nonce,
            PendingInstall {
                shop,
                user_id: user.id,
            },
        )
        .await;

    Ok(Json(InstallResponse { auth_url }))
}

/// OAuth redirect target. Verifies the request, stores the offline token
/// and subscribes to order webhooks before sending the merchant back to
/// the dashboard.
#[instrument(skip_all)]
async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect> {
    let config = state.config();
    if !verify_callback_hmac(&params, &config.shopify.api_secret) {
        warn!("OAuth callback with invalid HMAC");
        return Err(AppError::Unauthorized("Invalid HMAC".to_string()));
    }

    let install = match params.get("state") {
        Some(nonce) => state.take_install(nonce).await,
        None => None,
    }
    .ok_or_else(|| AppError::Unauthorized("Invalid or expired state".to_string()))?;

    let shop = parse_shop(params.get("shop").map_or("", String::as_str))?;
    if shop != install.shop {
        warn!(expected = %install.shop, received = %shop, "OAuth callback for a different shop");
        return Err(AppError::Unauthorized("Shop mismatch".to_string()));
    }
    let code = params
        .get("code")
        .ok_or_else(|| AppError::BadRequest("Missing code".to_string()))?;

    let access_token = state.commerce().exchange_code(&shop, code).await?;

    let address = config.api_url("/shopify/webhook");
    let mut webhook_ids = Vec::with_capacity(WEBHOOK_TOPICS.len());
    for topic in WEBHOOK_TOPICS {
        match state
            .commerce()
            .register_webhook(&shop, &access_token, topic, &address)
            .await
        {
            Ok(id) => webhook_ids.push(id),
            Err(e) => warn!(shop = %shop, topic, error = %e, "Webhook registration failed"),
        }
    }

    let repos = state.repos();
    let store = repos
        .stores
        .upsert(NewStore {
            shop_domain: shop.clone(),
            access_token,
            webhook_secret: None,
            webhook_ids,
        })
        .await?;
    repos.users.set_store(install.user_id, Some(store.id)).await?;

    info!(shop = %shop, store_id = %store.id, "Shopify store connected");
    Ok(Redirect::to(&format!(
        "{}/dashboard?shop={}",
        config.frontend_url,
        urlencoding::encode(shop.as_str())
    )))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Secret that signs this store's webhooks.
fn webhook_secret<'a>(state: &'a AppState, store: Option<&'a Store>) -> &'a [u8] {
    store
        .and_then(|s| s.webhook_secret.as_ref())
        .unwrap_or(&state.config().shopify.api_secret)
        .expose_secret()
        .as_bytes()
}

/// Order webhooks. The signature covers the raw body, so it is verified
/// before any parsing. Valid deliveries always get a 2xx.
#[instrument(skip_all)]
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = header_str(&headers, HMAC_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Missing HMAC header".to_string()))?;

    let store = match header_str(&headers, SHOP_HEADER).map(ShopDomain::parse) {
        Some(Ok(shop)) => state.repos().stores.get_by_domain(&shop).await?,
        _ => None,
    };

    if !verify_signature(&body, signature, webhook_secret(&state, store.as_ref())) {
        warn!("Webhook with invalid signature");
        return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
    }

    let Some(store) = store.filter(Store::is_connected) else {
        info!("Webhook for an unknown or disconnected store ignored");
        return Ok(Json(json!({ "status": "success", "result": "skipped" })));
    };

    let topic = header_str(&headers, TOPIC_HEADER).unwrap_or_default();
    let outcome = webhooks::handle(&state, &store, topic, &body).await;
    info!(topic, outcome = outcome.as_str(), "Webhook processed");
    Ok(Json(json!({ "status": "success", "result": outcome.as_str() })))
}

#[instrument(skip_all)]
async fn store_info(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<StoreResponse>> {
    let store = current_store(&state, &user).await?;
    let shop = match state.commerce().fetch_shop(&store).await {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(shop = %store.shop_domain, error = %e, "Shop details unavailable");
            None
        }
    };
    Ok(Json(StoreResponse {
        store: StoreView::from(&store),
        shop,
    }))
}

/// Remove webhook subscriptions and disconnect the store. The store row and
/// its orders are kept for a later reconnect.
#[instrument(skip_all)]
async fn disconnect(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>> {
    let store = current_store(&state, &user).await?;

    for webhook_id in &store.webhook_ids {
        if let Err(e) = state.commerce().deregister_webhook(&store, *webhook_id).await {
            warn!(shop = %store.shop_domain, webhook_id, error = %e, "Webhook removal failed");
        }
    }

    state.repos().stores.disconnect(store.id).await?;
    info!(shop = %store.shop_domain, "Shopify store disconnected");
    Ok(Json(json!({ "status": "success" })))
}
