//! End-to-end order confirmation: webhook in, call out, keypad input and
//! status callback back in.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use voice_confirm_core::{CallStatus, OrderStatus, StoreId};
use voice_confirm_integration_tests::{StalledRetries, TestContext, order_payload};
use voice_confirm_server::models::{Order, OrderFilter, Page};

const SHOP: &str = "acme.myshopify.com";

async fn orders_of(ctx: &TestContext, store_id: StoreId) -> Vec<Order> {
    ctx.state
        .repos()
        .orders
        .list(
            OrderFilter {
                store_id: Some(store_id),
                ..OrderFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_new_order_is_called_and_confirmed() {
    let ctx = TestContext::new();
    let (token, store) = ctx.merchant("owner@acme.test", SHOP).await;

    let response = ctx
        .webhook(SHOP, "orders/create", &order_payload(5001, 1001, Some("0300 1234567")))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "status": "success", "result": "created" })
    );

    let dialed = ctx.telephony.dialed();
    assert_eq!(dialed.len(), 1);
    assert_eq!(dialed[0].to.as_str(), "+923001234567");
    assert_eq!(dialed[0].order_number, "1001");
    let call_sid = ctx.telephony.last_sid().unwrap();

    let listed = ctx.get("/api/orders", Some(&token)).await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["orderNumber"], "1001");
    assert_eq!(listed[0]["customerName"], "Ayesha Khan");
    assert_eq!(listed[0]["status"], "pending");
    assert_eq!(listed[0]["callStatus"], "calling");
    assert_eq!(listed[0]["amount"], 2500.0);

    // Customer answers
    let menu = ctx
        .twilio(Method::POST, "/api/voice/welcome/1001", &[("CallSid", call_sid.as_str())])
        .await;
    assert_eq!(menu.status, StatusCode::OK);
    assert_eq!(menu.header("content-type"), Some("application/xml"));
    let markup = menu.text();
    assert!(markup.contains("<Gather"), "{markup}");
    assert!(markup.contains(r#"action="/api/voice/handle-input/1001""#), "{markup}");
    assert!(markup.contains(r#"language="ur-PK""#), "{markup}");

    // Presses 1
    let reply = ctx
        .twilio(
            Method::POST,
            "/api/voice/handle-input/1001",
            &[("CallSid", call_sid.as_str()), ("Digits", "1")],
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text().contains("<Hangup"), "{}", reply.text());

    // Call ends
    let status = ctx
        .twilio(
            Method::POST,
            "/api/voice/status/1001",
            &[
                ("CallSid", call_sid.as_str()),
                ("CallStatus", "completed"),
                ("CallDuration", "41"),
            ],
        )
        .await;
    assert_eq!(status.status, StatusCode::NO_CONTENT);

    let order = orders_of(&ctx, store.id).await.remove(0);
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.call_status, CallStatus::Completed);
    let history: Vec<_> = order
        .call_history
        .iter()
        .map(|e| (e.status, e.response.as_deref(), e.duration))
        .collect();
    assert_eq!(
        history,
        vec![
            (CallStatus::Calling, None, None),
            (CallStatus::Calling, Some("confirm"), None),
            (CallStatus::Completed, None, Some(41)),
        ]
    );
    assert_eq!(ctx.memory.retry_due_at(order.id).await, None);
}

#[tokio::test]
async fn test_completed_call_without_input_marks_called() {
    let ctx = TestContext::new();
    let (_, store) = ctx.merchant("owner@acme.test", SHOP).await;
    ctx.webhook(SHOP, "orders/create", &order_payload(5002, 1002, Some("+923001234567")))
        .await;
    let call_sid = ctx.telephony.last_sid().unwrap();

    ctx.twilio(
        Method::POST,
        "/api/voice/status/1002",
        &[("CallSid", call_sid.as_str()), ("CallStatus", "completed")],
    )
    .await;

    let order = orders_of(&ctx, store.id).await.remove(0);
    assert_eq!(order.status, OrderStatus::Called);
    assert_eq!(order.call_status, CallStatus::Completed);
}

#[tokio::test]
async fn test_redelivered_webhook_is_idempotent() {
    let ctx = TestContext::new();
    let (_, store) = ctx.merchant("owner@acme.test", SHOP).await;
    let payload = order_payload(5003, 1003, Some("+923001234567"));

    let first = ctx.webhook(SHOP, "orders/create", &payload).await;
    let second = ctx.webhook(SHOP, "orders/create", &payload).await;

    assert_eq!(first.json()["result"], "created");
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.json()["result"], "duplicate");
    assert_eq!(ctx.telephony.dialed().len(), 1);
    assert_eq!(orders_of(&ctx, store.id).await.len(), 1);
}

#[tokio::test]
async fn test_phone_is_fetched_when_missing_from_webhook() {
    let ctx = TestContext::new();
    let (_, store) = ctx.merchant("owner@acme.test", SHOP).await;
    ctx.commerce
        .put_order(order_payload(5004, 1004, Some("+923009876543")));

    let response = ctx
        .webhook(SHOP, "orders/create", &order_payload(5004, 1004, None))
        .await;

    assert_eq!(response.json()["result"], "created");
    let order = orders_of(&ctx, store.id).await.remove(0);
    assert_eq!(order.customer_phone.as_str(), "+923009876543");
}

#[tokio::test]
async fn test_order_without_any_phone_is_skipped() {
    let ctx = TestContext::new();
    let (_, store) = ctx.merchant("owner@acme.test", SHOP).await;

    let response = ctx
        .webhook(SHOP, "orders/create", &order_payload(5005, 1005, None))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["result"], "skipped");
    assert!(orders_of(&ctx, store.id).await.is_empty());
    assert!(ctx.telephony.dialed().is_empty());
}

#[tokio::test]
async fn test_cancelled_webhook_cancels_order() {
    let ctx = TestContext::new();
    let (_, store) = ctx.merchant("owner@acme.test", SHOP).await;
    ctx.webhook(SHOP, "orders/create", &order_payload(5006, 1006, Some("+923001234567")))
        .await;

    let response = ctx
        .webhook(SHOP, "orders/cancelled", &json!({ "id": 5006 }))
        .await;

    assert_eq!(response.json()["result"], "cancelled");
    let order = orders_of(&ctx, store.id).await.remove(0);
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_webhook_signature_is_required() {
    let ctx = TestContext::new();
    ctx.merchant("owner@acme.test", SHOP).await;
    let body = order_payload(5007, 1007, Some("+923001234567")).to_string();

    let missing = ctx
        .send(
            axum::http::Request::post("/api/shopify/webhook")
                .header("X-Shopify-Topic", "orders/create")
                .header("X-Shopify-Shop-Domain", SHOP)
                .body(axum::body::Body::from(body.clone()))
                .unwrap(),
        )
        .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json()["detail"], "Missing HMAC header");

    let forged = ctx
        .send(
            axum::http::Request::post("/api/shopify/webhook")
                .header("X-Shopify-Hmac-Sha256", "bm90IGEgcmVhbCBzaWduYXR1cmU=")
                .header("X-Shopify-Topic", "orders/create")
                .header("X-Shopify-Shop-Domain", SHOP)
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.json()["detail"], "Invalid webhook signature");
    assert!(ctx.telephony.dialed().is_empty());
}

#[tokio::test]
async fn test_webhook_for_unknown_shop_is_acknowledged() {
    let ctx = TestContext::new();

    let response = ctx
        .webhook(
            "stranger.myshopify.com",
            "orders/create",
            &order_payload(5008, 1008, Some("+923001234567")),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["result"], "skipped");
    assert!(ctx.telephony.dialed().is_empty());
}

#[tokio::test]
async fn test_redelivery_dials_an_order_that_was_never_called() {
    let ctx = TestContext::new();
    let (token, store) = ctx.merchant("owner@acme.test", SHOP).await;
    let created = ctx
        .json(
            Method::POST,
            "/api/orders",
            Some(&token),
            &json!({
                "shopifyOrderId": "5009",
                "orderNumber": "1009",
                "customerName": "Ayesha Khan",
                "customerPhone": "+923001234567",
                "amount": 2500
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert!(ctx.telephony.dialed().is_empty());

    let response = ctx
        .webhook(SHOP, "orders/create", &order_payload(5009, 1009, Some("+923001234567")))
        .await;
    assert_eq!(response.json()["result"], "duplicate");
    assert_eq!(ctx.telephony.dialed().len(), 1);

    // A second redelivery finds the order already dialed
    ctx.webhook(SHOP, "orders/create", &order_payload(5009, 1009, Some("+923001234567")))
        .await;
    assert_eq!(ctx.telephony.dialed().len(), 1);

    let orders = orders_of(&ctx, store.id).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].call_status, CallStatus::Calling);
}

#[tokio::test]
async fn test_same_order_number_in_two_shops_is_told_apart_by_call() {
    let ctx = TestContext::new();
    let (_, acme) = ctx.merchant("owner@acme.test", SHOP).await;
    let (_, globex) = ctx.merchant("owner@globex.test", "globex.myshopify.com").await;

    ctx.webhook(SHOP, "orders/create", &order_payload(6001, 1001, Some("+923001234567")))
        .await;
    let acme_sid = ctx.telephony.last_sid().unwrap();
    ctx.webhook(
        "globex.myshopify.com",
        "orders/create",
        &order_payload(7001, 1001, Some("+923009876543")),
    )
    .await;
    let globex_sid = ctx.telephony.last_sid().unwrap();
    assert_ne!(acme_sid, globex_sid);

    let reply = ctx
        .twilio(
            Method::POST,
            "/api/voice/handle-input/1001",
            &[("CallSid", acme_sid.as_str()), ("Digits", "1")],
        )
        .await;
    assert!(reply.text().contains("<Hangup"), "{}", reply.text());
    ctx.twilio(
        Method::POST,
        "/api/voice/status/1001",
        &[("CallSid", acme_sid.as_str()), ("CallStatus", "completed")],
    )
    .await;

    let acme_order = orders_of(&ctx, acme.id).await.remove(0);
    assert_eq!(acme_order.status, OrderStatus::Confirmed);
    assert_eq!(acme_order.call_status, CallStatus::Completed);
    let globex_order = orders_of(&ctx, globex.id).await.remove(0);
    assert_eq!(globex_order.status, OrderStatus::Pending);
    assert_eq!(globex_order.call_status, CallStatus::Calling);

    // Globex's customer cancels on their own call
    ctx.twilio(
        Method::POST,
        "/api/voice/handle-input/1001",
        &[("CallSid", globex_sid.as_str()), ("Digits", "0")],
    )
    .await;
    let globex_order = orders_of(&ctx, globex.id).await.remove(0);
    assert_eq!(globex_order.status, OrderStatus::Cancelled);
    let acme_order = orders_of(&ctx, acme.id).await.remove(0);
    assert_eq!(acme_order.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_status_callback_is_acknowledged_when_redial_cannot_be_queued() {
    let ctx = TestContext::with_retries(|memory| Arc::new(StalledRetries(memory)));
    let (_, store) = ctx.merchant("owner@acme.test", SHOP).await;
    ctx.webhook(SHOP, "orders/create", &order_payload(5010, 1010, Some("+923001234567")))
        .await;
    let call_sid = ctx.telephony.last_sid().unwrap();

    let response = ctx
        .twilio(
            Method::POST,
            "/api/voice/status/1010",
            &[("CallSid", call_sid.as_str()), ("CallStatus", "no-answer")],
        )
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let order = orders_of(&ctx, store.id).await.remove(0);
    assert_eq!(order.call_status, CallStatus::Failed);
    assert_eq!(ctx.memory.retry_due_at(order.id).await, None);
}
