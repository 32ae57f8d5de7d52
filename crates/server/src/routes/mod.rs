//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                         - Liveness
//! GET    /health/ready                   - Readiness (repository ping)
//!
//! # Auth
//! POST   /api/auth/register              - Create a merchant login
//! POST   /api/auth/token                 - OAuth2 password flow, returns bearer token
//! GET    /api/auth/me                    - Current user
//! PUT    /api/auth/me                    - Change email/password
//!
//! # Orders (bearer, scoped to the caller's store)
//! GET    /api/orders                     - List, newest first
//! POST   /api/orders                     - Manual entry, idempotent on shopifyOrderId
//! GET    /api/orders/{id}                - Detail
//! POST   /api/orders/{id}/call           - Dial now (409 while calling)
//! PUT    /api/orders/{id}/status         - Agent override
//! GET    /api/orders/{id}/call-status    - Ask the provider
//!
//! # Shopify
//! GET    /api/shopify/auth               - Start install (bearer)
//! GET    /api/shopify/callback           - OAuth callback
//! POST   /api/shopify/webhook            - Signed order webhooks
//! GET    /api/shopify/store              - Connected store (bearer)
//! DELETE /api/shopify/disconnect         - Remove store and webhooks (bearer)
//!
//! # Voice
//! GET    /api/voice/welcome/{n}          - Menu markup (provider, also POST)
//! POST   /api/voice/handle-input/{n}     - Keypad input (provider)
//! POST   /api/voice/status/{n}           - Call status callback (provider)
//! GET    /api/voice/settings             - Voice settings (bearer)
//! PUT    /api/voice/settings             - Update voice settings (bearer)
//! POST   /api/voice/test                 - Place a test call (bearer)
//! ```

pub mod auth;
pub mod health;
pub mod orders;
pub mod shopify;
pub mod voice;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

use voice_confirm_core::OrderId;

use crate::error::AppError;
use crate::middleware::request_id_middleware;
use crate::models::{Order, Store, User};
use crate::state::AppState;

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(orders::router())
        .merge(shopify::router())
        .merge(voice::router(&state));

    Router::new()
        .merge(health::router())
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(cors_layer(&state.config().frontend_url))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// CORS for the dashboard origin.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(frontend_url, "FRONTEND_URL is not a valid origin, CORS disabled");
            cors
        }
    }
}

/// The store the user manages.
///
/// # Errors
///
/// 404 "No store connected" if the user has none or it was disconnected,
/// "Store not found" if it was removed.
pub(crate) async fn current_store(state: &AppState, user: &User) -> Result<Store, AppError> {
    let store_id = user
        .store_id
        .ok_or_else(|| AppError::NotFound("No store connected".to_string()))?;
    let store = state
        .repos()
        .stores
        .get(store_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Store not found".to_string()))?;
    if !store.is_connected() {
        return Err(AppError::NotFound("No store connected".to_string()));
    }
    Ok(store)
}

/// Load an order the user's store owns. Other stores' orders are reported
/// as missing.
///
/// # Errors
///
/// 404 if the order does not exist or belongs to another store.
pub(crate) async fn owned_order(
    state: &AppState,
    user: &User,
    id: OrderId,
) -> Result<Order, AppError> {
    let store = current_store(state, user).await?;
    state
        .repos()
        .orders
        .get(id)
        .await?
        .filter(|order| order.is_owned_by(store.id))
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}
