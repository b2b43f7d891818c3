mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::Fixture;
use serde_json::{json, Value};
use stock_ledger::api::{router, AppState, STORE_IDS_HEADER, USER_ID_HEADER};
use tower::ServiceExt;

fn app(fx: &Fixture) -> Router {
    let state = AppState::new(
        Arc::new(fx.ledger.clone()),
        Arc::new(fx.ledger.clone()),
        fx.clock.clone(),
        fx.settings,
    );
    router(state)
}

fn request(fx: &Fixture, method: &str, uri: &str, stores: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, fx.user.0.to_string())
        .header(STORE_IDS_HEADER, stores);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_adjust_endpoint_returns_new_quantity() {
    let fx = Fixture::new();
    let stores = format!("[{}]", fx.store);

    let response = app(&fx)
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-out/adjust",
            &stores,
            Some(json!({ "item_id": fx.item.0, "direction": "up" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["new_qty"], 1);
    assert_eq!(body["direction"], "up");
}

#[tokio::test]
async fn test_adjust_errors_map_to_problem_details() {
    let fx = Fixture::new();
    let stores = fx.store.to_string();

    let response = app(&fx)
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-out/adjust",
            &stores,
            Some(json!({ "item_id": fx.item.0, "direction": "down" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()["content-type"],
        "application/problem+json"
    );

    let response = app(&fx)
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-out/adjust",
            &stores,
            Some(json!({ "item_id": fx.item.0, "direction": "sideways" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_store_header_is_forbidden_for_writes() {
    let fx = Fixture::new();
    let response = app(&fx)
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-out/adjust",
            "",
            Some(json!({ "item_id": fx.item.0, "direction": "up" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(fx.ledger.stock_out_records().is_empty());
}

#[tokio::test]
async fn test_malformed_store_header_is_rejected() {
    let fx = Fixture::new();
    let response = app(&fx)
        .oneshot(request(&fx, "GET", "/api/dashboard", "1,abc", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_user_is_unauthenticated() {
    let fx = Fixture::new();
    let request = Request::builder()
        .uri("/api/dashboard")
        .body(Body::empty())
        .unwrap();
    let response = app(&fx).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_case_lifecycle_over_http() {
    let fx = Fixture::new();
    let stores = format!("[{}]", fx.store);
    let app = app(&fx);

    let response = app
        .clone()
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-out/cases",
            &stores,
            Some(json!({ "item_id": fx.item.0, "qty": 2, "reason": "damaged" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(request(&fx, "GET", "/api/stock-out/cases?limit=5", &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = read_json(response).await;
    assert_eq!(list["cases"].as_array().unwrap().len(), 1);

    let uri = format!("/api/stock-out/cases/{}", id);
    let response = app
        .clone()
        .oneshot(request(&fx, "DELETE", &uri, &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(&fx, "DELETE", &uri, &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_item_stock_and_dashboard_endpoints() {
    let fx = Fixture::new();
    let stores = format!("{}", fx.store);
    let app = app(&fx);

    let response = app
        .clone()
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-in",
            &stores,
            Some(json!({ "item_id": fx.item.0, "qty": 8 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(request(
            &fx,
            "GET",
            "/api/items/stock?only_in_stock=true&page=1&page_size=10",
            &stores,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = read_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["remaining"], 8);

    let response = app
        .clone()
        .oneshot(request(&fx, "GET", "/api/items/withdrawals", &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let board = read_json(response).await;
    assert_eq!(board["rows"][0]["available_today"], 8);

    let response = app
        .clone()
        .oneshot(request(&fx, "GET", "/api/dashboard", &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let dashboard = read_json(response).await;
    assert_eq!(dashboard["total_stock_in"]["quantity"], 8);
    assert_eq!(dashboard["weekly"]["categories"].as_array().unwrap().len(), 7);

    let response = app
        .oneshot(request(&fx, "GET", "/api/reports/users", &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let users = read_json(response).await;
    assert_eq!(users[0]["total_in"], 8);
}

#[tokio::test]
async fn test_huge_page_number_returns_empty_page() {
    let fx = Fixture::new();
    let stores = fx.store.to_string();

    for uri in [
        "/api/items/stock?page=4294967295&page_size=200",
        "/api/stock-in?page=4294967295&page_size=200",
    ] {
        let response = app(&fx)
            .oneshot(request(&fx, "GET", uri, &stores, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let page = read_json(response).await;
        assert_eq!(page["page"], 4_294_967_295u64);
        assert!(page["items"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_stock_in_history_and_user_detail_endpoints() {
    let fx = Fixture::new();
    let stores = fx.store.to_string();
    let app = app(&fx);

    let response = app
        .clone()
        .oneshot(request(
            &fx,
            "POST",
            "/api/stock-in",
            &stores,
            Some(json!({ "item_id": fx.item.0, "qty": 6, "note": "pallet" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(request(
            &fx,
            "GET",
            "/api/stock-in?item_name=gift&date=2026-03-10",
            &stores,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = read_json(response).await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["note"], "pallet");
    assert_eq!(history["items"][0]["store_name"], "Central");

    let response = app
        .clone()
        .oneshot(request(&fx, "GET", "/api/stock-in?date=10-03-2026", &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let uri = format!("/api/reports/users/{}?date=", fx.user);
    let response = app
        .clone()
        .oneshot(request(&fx, "GET", &uri, &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = read_json(response).await;
    assert_eq!(detail["user_name"], "alice");
    assert_eq!(detail["total_in"], 6);
    assert_eq!(detail["stock_in"].as_array().unwrap().len(), 1);

    // 无门店权限时只返回用户信息
    let response = app
        .clone()
        .oneshot(request(&fx, "GET", &uri, "", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = read_json(response).await;
    assert_eq!(detail["user_name"], "alice");
    assert_eq!(detail["total_in"], 0);
    assert!(detail["stock_in"].as_array().unwrap().is_empty());

    let response = app
        .oneshot(request(&fx, "GET", "/api/reports/users/9999", &stores, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let fx = Fixture::new();
    let app = app(&fx);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = read_json(response).await;
    assert_eq!(status["healthy"], true);
}
