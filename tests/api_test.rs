mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use ferrejunior::auth::Role;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
    assert_eq!(body["maps_configured"], false);
}

#[tokio::test]
async fn catalog_is_public_but_writes_need_an_admin() {
    let app = TestApp::new().await;
    app.seed_product("MART-016", dec!(35000), 12).await;
    let (_, client_token) = app.user(Role::Client);
    let (_, admin_token) = app.user(Role::Admin);

    let response = app.request(Method::GET, "/api/v1/products", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 1);
    assert_eq!(body["products"][0]["sku"], "MART-016");

    let new_product = json!({
        "name": "Destornillador de pala",
        "sku": "DEST-006",
        "price": "9500",
        "stock_quantity": 30
    });

    let response = app
        .request(Method::POST, "/api/v1/products", Some(new_product.clone()), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(new_product.clone()),
            Some(&client_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(new_product),
            Some(&admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["product"]["sku"], "DEST-006");
    assert_eq!(body["product"]["stock_quantity"], 30);
}

#[tokio::test]
async fn guests_receive_a_cart_session() {
    let app = TestApp::new().await;
    let product = app.seed_product("BROC-008", dec!(4200), 50).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/add",
            Some(json!({ "product_id": product.id, "quantity": 3 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let session = response
        .headers()
        .get("x-cart-session")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("session header issued");
    let body = body_json(response).await;
    assert_eq!(body["session_id"], session.as_str());
    assert_eq!(body["cart"]["item_count"], 3);

    let response = app
        .request_with_headers(
            Method::GET,
            "/api/v1/cart",
            None,
            None,
            &[("x-cart-session", session.as_str())],
        )
        .await;
    assert!(response.headers().get("x-cart-session").is_none());
    let body = body_json(response).await;
    assert_eq!(body["cart"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(app.stock_of(product.id).await, 47);
}

#[tokio::test]
async fn checkout_over_http_returns_the_order_number() {
    let app = TestApp::new().await;
    let product = app.seed_product("PINT-GAL", dec!(60000), 4).await;
    let (_, token) = app.user(Role::Client);

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/add",
            Some(json!({ "product_id": product.id, "quantity": 2 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/create-order",
            Some(json!({ "payment_method": "pse" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let order_number = body["order_number"].as_str().expect("order number");
    assert!(order_number.starts_with("ORD"));
    assert_eq!(body["order"]["order_number"], order_number);
    assert_eq!(body["order"]["payment_method"], "pse");
    assert_eq!(body["order"]["items"].as_array().map(Vec::len), Some(1));

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/create-order",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);

    let response = app.request(Method::GET, "/api/v1/orders", None, Some(&token)).await;
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn delivery_can_be_followed_over_http() {
    let app = TestApp::new().await;
    let (client, client_token) = app.user(Role::Client);
    let (_, driver_token) = app.user(Role::Employee);
    let order = app
        .place_order(client.user_id, Some("Calle 26 # 68-35"))
        .await;
    let base = format!("/api/v1/tracking/order/{}", order.id);

    let response = app.request(Method::GET, &base, None, Some(&client_token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["has_tracking"], false);

    let response = app
        .request(
            Method::POST,
            &format!("{}/start", base),
            Some(json!({ "driver_name": "Andrés" })),
            Some(&client_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            &format!("{}/start", base),
            Some(json!({ "driver_name": "Andrés" })),
            Some(&driver_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tracking"]["state"], "in_transit");

    app.maps.push_distance(4.0);
    let response = app
        .request(
            Method::PUT,
            &format!("{}/location", base),
            Some(json!({ "latitude": 4.65, "longitude": -74.06 })),
            Some(&driver_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PUT,
            &format!("{}/location", base),
            Some(json!({ "latitude": 123.0, "longitude": -74.06 })),
            Some(&driver_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::GET, &format!("{}/route", base), None, Some(&client_token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["route"]["polyline"], "abc123");

    let response = app
        .request(
            Method::POST,
            &format!("{}/complete", base),
            None,
            Some(&driver_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["order"]["status"], "delivered");

    let response = app
        .request(
            Method::GET,
            "/api/v1/tracking/notifications/unread-count",
            None,
            Some(&client_token),
        )
        .await;
    let body = body_json(response).await;
    assert!(body["unread_count"].as_u64().unwrap_or_default() >= 3);
}

#[tokio::test]
async fn errors_carry_the_request_id() {
    let app = TestApp::new().await;
    let (_, token) = app.user(Role::Client);

    let response = app
        .request_with_headers(
            Method::GET,
            &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()),
            None,
            Some(&token),
            &[("x-request-id", "mostrador-7")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "mostrador-7"
    );

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "Not Found");
    assert_eq!(body["request_id"], "mostrador-7");
}

#[tokio::test]
async fn invalid_tokens_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/add",
            Some(json!({ "quantity": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "Bad Request");
    assert!(body["error"].as_str().unwrap_or_default().contains("product_id"));
}

#[tokio::test]
async fn optional_bodies_must_still_be_valid_json() {
    let app = TestApp::new().await;
    let (_, token) = app.user(Role::Client);

    let response = app
        .request_with_headers(
            Method::PUT,
            "/api/v1/tracking/notifications/read-all",
            None,
            Some(&token),
            &[("content-type", "application/json")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PUT,
            "/api/v1/tracking/notifications/read-all",
            Some(json!({ "order_id": "not-a-uuid" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_ids_and_queries_are_validation_errors() {
    let app = TestApp::new().await;
    let (_, token) = app.user(Role::Client);

    let response = app
        .request(Method::GET, "/api/v1/orders/not-a-uuid", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);

    let response = app
        .request(
            Method::GET,
            "/api/v1/tracking/notifications?limit=lots",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}
