//! HTTP API tests against the in-memory store.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use stockhold_core::KeyValueStore;
use stockhold_engine::{Engine, EngineConfig};
use stockhold_testing::InMemoryStore;
use stockhold_web::{AppState, build_router};

fn setup() -> (TestServer, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Engine::new(store.clone(), EngineConfig::default());
    let server = TestServer::new(build_router(AppState::new(engine))).unwrap();
    (server, store)
}

async fn set_stock(server: &TestServer, item: &str, quantity: i64) {
    server
        .put(&format!("/api/admin/inventory/{item}"))
        .json(&json!({ "quantity": quantity }))
        .await
        .assert_status_ok();
}

async fn hold(server: &TestServer, item: &str, session: &str, quantity: u32) -> axum_test::TestResponse {
    server
        .post("/api/checkout/holds")
        .json(&json!({ "item_id": item, "session_id": session, "quantity": quantity }))
        .await
}

#[tokio::test]
async fn test_health() {
    let (server, _) = setup();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_hold_lifecycle() {
    let (server, _) = setup();
    set_stock(&server, "mug", 5).await;

    let response = hold(&server, "mug", "cs_A", 2).await;
    response.assert_status(StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "reserved");
    assert_eq!(body["hold"]["quantity"], 2);

    let availability = server.get("/api/inventory/mug").await.json::<Value>();
    assert_eq!(availability["available"], 3);
    assert_eq!(availability["reserved"], 2);

    // Same session again: nothing new reserved.
    let response = hold(&server, "mug", "cs_A", 2).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "already_held");

    let released = server
        .post("/api/checkout/holds/cs_A/release")
        .await
        .json::<Value>();
    assert_eq!(released["released"], true);

    let released = server
        .post("/api/checkout/holds/cs_A/release")
        .await
        .json::<Value>();
    assert_eq!(released["released"], false);

    let availability = server.get("/api/inventory/mug").await.json::<Value>();
    assert_eq!(availability["available"], 5);
}

#[tokio::test]
async fn test_sold_out_is_409() {
    let (server, _) = setup();
    set_stock(&server, "mug", 1).await;

    hold(&server, "mug", "cs_A", 1).await.assert_status(StatusCode::CREATED);
    let response = hold(&server, "mug", "cs_B", 1).await;
    response.assert_status(StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "SOLD_OUT");
    assert!(body["message"].as_str().unwrap().contains("sold out"));
}

#[tokio::test]
async fn test_rate_limited_is_429() {
    let (server, _) = setup();
    set_stock(&server, "mug", 20).await;

    let forwarded = HeaderName::from_static("x-forwarded-for");
    for i in 0..5 {
        server
            .post("/api/checkout/holds")
            .add_header(forwarded.clone(), HeaderValue::from_static("203.0.113.9"))
            .json(&json!({ "item_id": "mug", "session_id": format!("cs_{i}") }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = server
        .post("/api/checkout/holds")
        .add_header(forwarded, HeaderValue::from_static("203.0.113.9"))
        .json(&json!({ "item_id": "mug", "session_id": "cs_6" }))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(
        response.json::<Value>()["message"]
            .as_str()
            .unwrap()
            .contains("Too many")
    );
}

#[tokio::test]
async fn test_item_at_capacity_is_429() {
    let (server, store) = setup();
    set_stock(&server, "mug", 100).await;
    store
        .set("stockhold:reserved:mug", "25".to_string())
        .await
        .unwrap();

    let response = hold(&server, "mug", "cs_A", 1).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "TOO_MANY_ATTEMPTS");
    assert!(body["message"].as_str().unwrap().contains("Too many"));
}

#[tokio::test]
async fn test_validation_is_422() {
    let (server, _) = setup();

    hold(&server, "mug", "cs_A", 0)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    hold(&server, "mug", "cs A", 1)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let response = server
        .put("/api/admin/inventory/mug")
        .json(&json!({ "quantity": -3 }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_store_outage_is_503_with_generic_message() {
    let (server, store) = setup();
    set_stock(&server, "mug", 3).await;
    store.set_offline(true);

    let response = hold(&server, "mug", "cs_A", 1).await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let message = response.json::<Value>()["message"].as_str().unwrap().to_string();
    assert!(!message.contains("store"));

    // Read path degrades to zero instead of failing.
    let availability = server.get("/api/inventory/mug").await;
    availability.assert_status_ok();
    assert_eq!(availability.json::<Value>()["available"], 0);
}

#[tokio::test]
async fn test_payment_webhook_confirms_hold() {
    let (server, _) = setup();
    set_stock(&server, "mug", 2).await;
    hold(&server, "mug", "cs_A", 1).await.assert_status(StatusCode::CREATED);

    let response = server
        .post("/api/webhooks/payments")
        .json(&json!({
            "event": "completed",
            "session_id": "cs_A",
            "item_id": "mug",
            "had_reservation": true,
            "payment_confirmed": true
        }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["outcome"], "confirmed");

    let availability = server.get("/api/inventory/mug").await.json::<Value>();
    assert_eq!(availability["stock"], 1);
    assert_eq!(availability["reserved"], 0);
}

#[tokio::test]
async fn test_admin_inventory_restock_and_sync() {
    let (server, _) = setup();
    set_stock(&server, "mug", 2).await;

    let response = server
        .post("/api/admin/inventory/mug/restock")
        .json(&json!({ "amount": 3 }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["stock"], 5);

    let report = server
        .post("/api/admin/inventory/sync")
        .json(&json!({ "items": [{ "item_id": "mug" }, { "item_id": "tee", "name": "T-shirt" }] }))
        .await
        .json::<Value>();
    assert_eq!(report["created"], json!(["tee"]));
    assert_eq!(report["existing"], json!(["mug"]));

    let listing = server.get("/api/admin/inventory").await.json::<Value>();
    assert_eq!(
        listing["items"],
        json!([{ "item_id": "mug", "stock": 5 }, { "item_id": "tee", "stock": 0 }])
    );
}

#[tokio::test]
async fn test_admin_reservations_and_sweep() {
    let (server, store) = setup();
    set_stock(&server, "mug", 5).await;
    hold(&server, "mug", "cs_A", 1).await.assert_status(StatusCode::CREATED);
    store
        .set("stockhold:reserved:tee", "4".to_string())
        .await
        .unwrap();

    let report = server.get("/api/admin/reservations").await.json::<Value>();
    assert_eq!(report["active_holds"].as_array().unwrap().len(), 1);
    assert_eq!(
        report["orphaned_counters"],
        json!([{ "item_id": "tee", "count": 4 }])
    );

    let sweep = server
        .post("/api/admin/reservations/sweep")
        .json(&json!({}))
        .await;
    sweep.assert_status_ok();
    assert_eq!(sweep.json::<Value>()["forced"], false);
    assert_eq!(store.get("stockhold:reserved:tee").await.unwrap(), None);

    server
        .post("/api/admin/reservations/sweep")
        .json(&json!({ "force": true, "reason": "  " }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let forced = server
        .post("/api/admin/reservations/sweep")
        .json(&json!({ "force": true, "reason": "stuck checkout incident" }))
        .await
        .json::<Value>();
    assert_eq!(forced["forced"], true);
    assert_eq!(forced["holds_deleted"], 1);

    let availability = server.get("/api/inventory/mug").await.json::<Value>();
    assert_eq!(availability["available"], 5);
}
