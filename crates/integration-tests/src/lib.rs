//! Integration tests for Voice Confirm.
//!
//! The full router runs in-process against in-memory repositories, with
//! the Shopify and Twilio adapters replaced by the doubles below. Requests
//! go through every layer (auth, signature checks, error mapping) exactly
//! as in production.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p voice-confirm-integration-tests
//!
//! # Including the smoke test against a running server
//! cargo test -p voice-confirm-integration-tests -- --ignored
//! ```

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;

use voice_confirm_core::{OrderId, PhoneNumber, ShopDomain};
use voice_confirm_server::{
    AppConfig, AppState, app,
    config::{AuthConfig, ShopifyAppConfig, TwilioConfig},
    db::{MemoryStore, Repositories, RepositoryError, RetryQueue, memory::new_store},
    models::Store,
    services::{
        shopify::{CommercePlatform, OrderPayload, ShopInfo, ShopifyError, webhook},
        telephony::{
            CallPlacement, ProviderCallStatus, Telephony, TelephonyError, signature,
        },
    },
};

pub const BASE_URL: &str = "https://voice.example.com";
pub const FRONTEND_URL: &str = "https://dashboard.example.com";
pub const SHOPIFY_SECRET: &str = "shpss_integration_secret";
pub const TWILIO_TOKEN: &str = "twilio-integration-token";
pub const SUPPORT_NUMBER: &str = "+923001112222";
pub const PASSWORD: &str = "correct horse battery";

/// Configuration pointing at nothing real.
#[must_use]
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: SecretString::from("postgres://unused/unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: BASE_URL.to_string(),
        frontend_url: FRONTEND_URL.to_string(),
        auth: AuthConfig {
            jwt_secret: SecretString::from("k7Pq2xR9vL4mN8sT1wY6zB3cF5hJ0gD"),
            token_ttl_minutes: 30,
        },
        shopify: ShopifyAppConfig {
            api_key: "integration-key".to_string(),
            api_secret: SecretString::from(SHOPIFY_SECRET),
            api_version: "2024-01".to_string(),
            scopes: vec!["read_orders".to_string(), "read_customers".to_string()],
        },
        twilio: TwilioConfig {
            account_sid: "AC00000000000000000000000000000000".to_string(),
            auth_token: SecretString::from(TWILIO_TOKEN),
            from_number: "+15005550006".to_string(),
            support_number: SUPPORT_NUMBER.to_string(),
            validate_signatures: true,
            api_base: "http://127.0.0.1:9".to_string(),
        },
        default_country_code: Some("92".to_string()),
        retry_poll_interval: Duration::from_secs(15),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

// ============================================================================
// Adapter doubles
// ============================================================================

/// A number dialed through [`FakeTelephony`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialedCall {
    pub to: PhoneNumber,
    pub order_number: String,
    pub call_sid: Option<String>,
}

/// Telephony double: places calls instantly, or fails them on request.
#[derive(Default)]
pub struct FakeTelephony {
    script: Mutex<VecDeque<CallPlacement>>,
    dialed: Mutex<Vec<DialedCall>>,
}

impl FakeTelephony {
    /// The next placement is rejected by the provider.
    pub fn fail_next(&self, error: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(CallPlacement::failed(error));
    }

    #[must_use]
    pub fn dialed(&self) -> Vec<DialedCall> {
        self.dialed.lock().unwrap().clone()
    }

    /// Sid of the most recent successful placement.
    #[must_use]
    pub fn last_sid(&self) -> Option<String> {
        self.dialed
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|call| call.call_sid.clone())
    }
}

#[async_trait]
impl Telephony for FakeTelephony {
    async fn place_call(&self, to: &PhoneNumber, order_number: &str) -> CallPlacement {
        let mut dialed = self.dialed.lock().unwrap();
        let placement = self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            CallPlacement::placed(format!("CA{:032}", dialed.len() + 1), "queued")
        });
        dialed.push(DialedCall {
            to: to.clone(),
            order_number: order_number.to_string(),
            call_sid: placement.call_sid.clone(),
        });
        placement
    }

    async fn fetch_call_status(
        &self,
        call_sid: &str,
    ) -> Result<ProviderCallStatus, TelephonyError> {
        let known = self
            .dialed
            .lock()
            .unwrap()
            .iter()
            .any(|call| call.call_sid.as_deref() == Some(call_sid));
        if !known {
            return Err(TelephonyError::NotFound);
        }
        Ok(ProviderCallStatus {
            call_sid: call_sid.to_string(),
            status: "completed".to_string(),
            duration: Some(37),
            timestamp: Utc::now(),
        })
    }
}

/// The only authorization code [`FakeCommerce`] accepts.
pub const VALID_CODE: &str = "valid-code";
pub const ACCESS_TOKEN: &str = "shpat_integration";

/// Shopify double.
pub struct FakeCommerce {
    orders: Mutex<HashMap<String, Value>>,
    next_webhook_id: AtomicI64,
    registered: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<i64>>,
}

impl Default for FakeCommerce {
    fn default() -> Self {
        Self {
            orders: Mutex::default(),
            next_webhook_id: AtomicI64::new(1000),
            registered: Mutex::default(),
            removed: Mutex::default(),
        }
    }
}

impl FakeCommerce {
    /// Serve `order` from the Admin API order endpoint.
    pub fn put_order(&self, order: Value) {
        let id = order["id"].to_string();
        self.orders.lock().unwrap().insert(id, order);
    }

    /// `(topic, address)` of every webhook registered so far.
    #[must_use]
    pub fn registered(&self) -> Vec<(String, String)> {
        self.registered.lock().unwrap().clone()
    }

    #[must_use]
    pub fn removed(&self) -> Vec<i64> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommercePlatform for FakeCommerce {
    async fn exchange_code(
        &self,
        _shop: &ShopDomain,
        code: &str,
    ) -> Result<SecretString, ShopifyError> {
        if code == VALID_CODE {
            Ok(SecretString::from(ACCESS_TOKEN))
        } else {
            Err(ShopifyError::OAuth("invalid authorization code".to_string()))
        }
    }

    async fn fetch_order(
        &self,
        _store: &Store,
        order_id: &str,
    ) -> Result<OrderPayload, ShopifyError> {
        let order = self
            .orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| ShopifyError::NotFound(format!("order {order_id}")))?;
        Ok(serde_json::from_value(order)?)
    }

    async fn fetch_shop(&self, store: &Store) -> Result<ShopInfo, ShopifyError> {
        Ok(ShopInfo {
            id: 1,
            name: store.shop_domain.shop_name().to_string(),
            email: Some("owner@example.com".to_string()),
            domain: None,
            plan_name: Some("basic".to_string()),
            myshopify_domain: store.shop_domain.to_string(),
        })
    }

    async fn register_webhook(
        &self,
        _shop: &ShopDomain,
        _access_token: &SecretString,
        topic: &str,
        address: &str,
    ) -> Result<i64, ShopifyError> {
        self.registered
            .lock()
            .unwrap()
            .push((topic.to_string(), address.to_string()));
        Ok(self.next_webhook_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn deregister_webhook(
        &self,
        _store: &Store,
        webhook_id: i64,
    ) -> Result<bool, ShopifyError> {
        self.removed.lock().unwrap().push(webhook_id);
        Ok(true)
    }
}

/// Redial queue whose `schedule` always fails; everything else is in memory.
pub struct StalledRetries(pub Arc<MemoryStore>);

#[async_trait]
impl RetryQueue for StalledRetries {
    async fn schedule(
        &self,
        _order_id: OrderId,
        _due_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::DataCorruption("redial queue offline".to_string()))
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OrderId>, RepositoryError> {
        self.0.take_due(now, limit).await
    }

    async fn cancel(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        self.0.cancel(order_id).await
    }
}

// ============================================================================
// Test context
// ============================================================================

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("not JSON ({e}): {}", self.text()))
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One application instance with its doubles.
pub struct TestContext {
    pub state: AppState,
    pub memory: Arc<MemoryStore>,
    pub telephony: Arc<FakeTelephony>,
    pub commerce: Arc<FakeCommerce>,
    app: Router,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    #[must_use]
    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, |memory| memory as Arc<dyn RetryQueue>)
    }

    /// In-memory repositories with the redial queue swapped out.
    #[must_use]
    pub fn with_retries(retries: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn RetryQueue>) -> Self {
        Self::build(test_config(), retries)
    }

    fn build(
        config: AppConfig,
        retries: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn RetryQueue>,
    ) -> Self {
        let memory = Arc::new(MemoryStore::default());
        let repos = Repositories {
            orders: memory.clone(),
            stores: memory.clone(),
            users: memory.clone(),
            retries: retries(memory.clone()),
        };
        let telephony = Arc::new(FakeTelephony::default());
        let commerce = Arc::new(FakeCommerce::default());
        let state = AppState::new(config, repos, commerce.clone(), telephony.clone());
        Self {
            app: app(state.clone()),
            state,
            memory,
            telephony,
            commerce,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn builder(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(
            Self::builder(Method::GET, uri, token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(
            Self::builder(Method::DELETE, uri, token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &Value,
    ) -> TestResponse {
        self.send(
            Self::builder(method, uri, token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn form(&self, uri: &str, pairs: &[(&str, &str)]) -> TestResponse {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(encode_form(pairs)))
                .unwrap(),
        )
        .await
    }

    /// A provider callback signed the way Twilio signs it.
    pub async fn twilio(&self, method: Method, path: &str, pairs: &[(&str, &str)]) -> TestResponse {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let url = format!("{BASE_URL}{path}");
        let sig = signature::compute(&url, &owned, TWILIO_TOKEN).unwrap();

        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(signature::SIGNATURE_HEADER, sig);
        let request = if pairs.is_empty() {
            builder.body(Body::empty()).unwrap()
        } else {
            builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(encode_form(pairs)))
                .unwrap()
        };
        self.send(request).await
    }

    /// A Shopify webhook delivery signed with the app secret.
    pub async fn webhook(&self, shop: &str, topic: &str, body: &Value) -> TestResponse {
        let raw = body.to_string();
        let hmac = webhook::sign(raw.as_bytes(), SHOPIFY_SECRET.as_bytes()).unwrap();
        self.send(
            Request::post("/api/shopify/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header(webhook::HMAC_HEADER, hmac)
                .header(webhook::TOPIC_HEADER, topic)
                .header(webhook::SHOP_HEADER, shop)
                .body(Body::from(raw))
                .unwrap(),
        )
        .await
    }

    /// Register `email` and return a bearer token for it.
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/auth/register",
                None,
                &serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());

        let response = self
            .form("/api/auth/token", &[("username", email), ("password", PASSWORD)])
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.json()["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// A logged-in merchant with a connected store, seeded directly.
    pub async fn merchant(&self, email: &str, shop: &str) -> (String, Store) {
        let token = self.login(email).await;
        let repos = self.state.repos();
        let store = repos
            .stores
            .upsert(new_store(ShopDomain::parse(shop).unwrap(), ACCESS_TOKEN))
            .await
            .unwrap();
        let user = self.state.tokens().verify(&token).unwrap();
        repos.users.set_store(user, Some(store.id)).await.unwrap();
        (token, store)
    }
}

#[must_use]
pub fn encode_form(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Sign OAuth callback parameters the way Shopify does.
#[must_use]
pub fn sign_callback(params: &[(&str, &str)]) -> String {
    let mut pairs = params.to_vec();
    pairs.sort_unstable();
    let message = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut mac = Hmac::<Sha256>::new_from_slice(SHOPIFY_SECRET.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A Shopify `orders/create` payload.
#[must_use]
pub fn order_payload(id: i64, order_number: i64, phone: Option<&str>) -> Value {
    serde_json::json!({
        "id": id,
        "order_number": order_number,
        "name": format!("#{order_number}"),
        "phone": phone,
        "total_price": "2500.00",
        "customer": {
            "first_name": "Ayesha",
            "last_name": "Khan",
            "phone": null
        },
        "shipping_address": null,
        "billing_address": null
    })
}
