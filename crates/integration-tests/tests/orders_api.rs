//! Dashboard order endpoints.

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use voice_confirm_core::{CallStatus, OrderId};
use voice_confirm_integration_tests::TestContext;

fn manual_order(external: &str, number: &str) -> Value {
    json!({
        "shopifyOrderId": external,
        "orderNumber": number,
        "customerName": "Bilal Ahmed",
        "customerPhone": "03001234567",
        "amount": 1499.5
    })
}

async fn create(ctx: &TestContext, token: &str, external: &str, number: &str) -> Value {
    let response = ctx
        .json(
            Method::POST,
            "/api/orders",
            Some(token),
            &manual_order(external, number),
        )
        .await;
    assert!(response.status.is_success(), "{}", response.text());
    response.json()
}

#[tokio::test]
async fn test_manual_entry_is_idempotent() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;

    let first = ctx
        .json(Method::POST, "/api/orders", Some(&token), &manual_order("9001", "2001"))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    let created = first.json();
    assert_eq!(created["customerPhone"], "+923001234567");
    assert_eq!(created["status"], "pending");
    assert_eq!(created["callStatus"], "not_called");
    assert_eq!(created["callHistory"], json!([]));

    let second = ctx
        .json(Method::POST, "/api/orders", Some(&token), &manual_order("9001", "2001"))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.json()["id"], created["id"]);

    // Manual entry does not dial
    assert!(ctx.telephony.dialed().is_empty());
}

#[tokio::test]
async fn test_manual_entry_validation() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;

    let mut bad_phone = manual_order("9002", "2002");
    bad_phone["customerPhone"] = json!("call me maybe");
    let response = ctx
        .json(Method::POST, "/api/orders", Some(&token), &bad_phone)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let mut negative = manual_order("9003", "2003");
    negative["amount"] = json!(-1);
    let response = ctx
        .json(Method::POST, "/api/orders", Some(&token), &negative)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_endpoints_require_a_connected_store() {
    let ctx = TestContext::new();
    let token = ctx.login("nostore@acme.test").await;

    let response = ctx.get("/api/orders", Some(&token)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["detail"], "No store connected");

    let response = ctx.get("/api/orders", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.header("www-authenticate"), Some("Bearer"));
}

#[tokio::test]
async fn test_list_filters_and_pagination() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;
    for i in 0..5 {
        create(&ctx, &token, &format!("90{i}"), &format!("300{i}")).await;
    }
    let last = create(&ctx, &token, "999", "3999").await;
    let response = ctx
        .json(
            Method::PUT,
            &format!("/api/orders/{}/status", last["id"]),
            Some(&token),
            &json!({ "status": "confirmed" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let page = ctx.get("/api/orders?skip=1&limit=2", Some(&token)).await.json();
    let numbers: Vec<_> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["orderNumber"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(numbers, vec!["3004", "3003"]);

    let confirmed = ctx
        .get("/api/orders?status=confirmed", Some(&token))
        .await
        .json();
    assert_eq!(confirmed.as_array().unwrap().len(), 1);
    assert_eq!(confirmed[0]["orderNumber"], "3999");

    let not_called = ctx
        .get("/api/orders?call_status=not_called&limit=100", Some(&token))
        .await
        .json();
    assert_eq!(not_called.as_array().unwrap().len(), 6);

    for query in ["limit=0", "limit=101", "status=shipped", "call_status=dialing"] {
        let response = ctx.get(&format!("/api/orders?{query}"), Some(&token)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{query}");
    }
}

#[tokio::test]
async fn test_orders_of_other_stores_are_invisible() {
    let ctx = TestContext::new();
    let (acme, _) = ctx.merchant("owner@acme.test", "acme").await;
    let (globex, _) = ctx.merchant("owner@globex.test", "globex").await;
    let order = create(&ctx, &acme, "9100", "4100").await;
    let id = &order["id"];

    let response = ctx.get(&format!("/api/orders/{id}"), Some(&globex)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["detail"], "Order not found");

    let response = ctx
        .json(
            Method::POST,
            &format!("/api/orders/{id}/call"),
            Some(&globex),
            &json!({}),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(ctx.telephony.dialed().is_empty());

    let listed = ctx.get("/api/orders", Some(&globex)).await.json();
    assert_eq!(listed, json!([]));

    let response = ctx.get(&format!("/api/orders/{id}"), Some(&acme)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_manual_call_and_conflict_while_calling() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;
    let order = create(&ctx, &token, "9200", "4200").await;
    let uri = format!("/api/orders/{}/call", order["id"]);

    let response = ctx.json(Method::POST, &uri, Some(&token), &json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["order"]["callStatus"], "calling");
    assert_eq!(body["call"]["status"], "queued");
    assert!(body["call"]["call_sid"].is_string());

    let response = ctx.json(Method::POST, &uri, Some(&token), &json!({})).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(ctx.telephony.dialed().len(), 1);
}

#[tokio::test]
async fn test_call_status_lookup() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;
    let order = create(&ctx, &token, "9300", "4300").await;
    let uri = format!("/api/orders/{}/call-status", order["id"]);

    let response = ctx.get(&uri, Some(&token)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["detail"], "No call initiated for this order");

    ctx.json(
        Method::POST,
        &format!("/api/orders/{}/call", order["id"]),
        Some(&token),
        &json!({}),
    )
    .await;

    let body = ctx.get(&uri, Some(&token)).await.json();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["duration"], 37);
    assert_eq!(body["call_sid"].as_str(), ctx.telephony.last_sid().as_deref());
}

#[tokio::test]
async fn test_status_override() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;
    let order = create(&ctx, &token, "9400", "4400").await;
    let uri = format!("/api/orders/{}/status", order["id"]);

    let response = ctx
        .json(Method::PUT, &uri, Some(&token), &json!({ "status": "support" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "support");

    let response = ctx
        .json(Method::PUT, &uri, Some(&token), &json!({ "status": "shipped" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let fetched = ctx
        .get(&format!("/api/orders/{}", order["id"]), Some(&token))
        .await
        .json();
    assert_eq!(fetched["status"], "support");
}

#[tokio::test]
async fn test_failed_call_is_redialed_until_attempts_run_out() {
    let ctx = TestContext::new();
    let (token, store) = ctx.merchant("owner@acme.test", "acme").await;
    ctx.json(
        Method::PUT,
        "/api/voice/settings",
        Some(&token),
        &json!({ "retryAttempts": 1, "retryDelay": 60 }),
    )
    .await;
    let order = create(&ctx, &token, "9500", "4500").await;
    let id = OrderId::new(order["id"].as_i64().unwrap());
    let call_uri = format!("/api/orders/{id}/call");

    ctx.telephony.fail_next("unreachable");
    let body = ctx
        .json(Method::POST, &call_uri, Some(&token), &json!({}))
        .await
        .json();
    assert_eq!(body["order"]["callStatus"], "failed");
    assert_eq!(body["call"]["error"], "unreachable");
    assert_eq!(body["order"]["callHistory"][0]["response"], "unreachable");

    let due = ctx.memory.retry_due_at(id).await.unwrap();
    assert!(due > Utc::now() + Duration::seconds(50));

    // Nothing is due yet
    let workflow = ctx.state.workflow();
    assert_eq!(workflow.run_due_retries(Utc::now(), 50).await.unwrap(), 0);

    ctx.telephony.fail_next("unreachable");
    let later = Utc::now() + Duration::seconds(61);
    assert_eq!(workflow.run_due_retries(later, 50).await.unwrap(), 1);
    assert_eq!(ctx.telephony.dialed().len(), 2);

    // Two failures exceed one retry: no further redial
    assert_eq!(ctx.memory.retry_due_at(id).await, None);
    let order = ctx.state.repos().orders.get(id).await.unwrap().unwrap();
    assert_eq!(order.call_status, CallStatus::Failed);
    assert_eq!(order.failed_attempts(), 2);
    assert_eq!(order.store_id, Some(store.id));
}

#[tokio::test]
async fn test_resolving_an_order_cancels_its_redial() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;
    let order = create(&ctx, &token, "9600", "4600").await;
    let id = OrderId::new(order["id"].as_i64().unwrap());

    ctx.telephony.fail_next("busy");
    ctx.json(
        Method::POST,
        &format!("/api/orders/{id}/call"),
        Some(&token),
        &json!({}),
    )
    .await;
    assert!(ctx.memory.retry_due_at(id).await.is_some());

    ctx.json(
        Method::PUT,
        &format!("/api/orders/{id}/status"),
        Some(&token),
        &json!({ "status": "cancelled" }),
    )
    .await;
    assert_eq!(ctx.memory.retry_due_at(id).await, None);
}

#[tokio::test]
async fn test_confirmation_while_call_is_live() {
    let ctx = TestContext::new();
    let (token, _) = ctx.merchant("owner@acme.test", "acme").await;
    let order = create(&ctx, &token, "S-100", "5100").await;
    let id = &order["id"];

    let response = ctx
        .json(Method::POST, &format!("/api/orders/{id}/call"), Some(&token), &json!({}))
        .await;
    assert_eq!(response.json()["order"]["callStatus"], "calling");

    let reply = ctx
        .twilio(Method::POST, "/api/voice/handle-input/5100", &[("Digits", "1")])
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let fetched = ctx.get(&format!("/api/orders/{id}"), Some(&token)).await.json();
    assert_eq!(fetched["shopifyOrderId"], "S-100");
    assert_eq!(fetched["status"], "confirmed");
    assert_eq!(fetched["callStatus"], "calling");
}
