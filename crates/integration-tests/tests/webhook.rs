//! IPN webhook endpoint: authentication and idempotent reconciliation.

use axum::http::StatusCode;
use rust_decimal_macros::dec;
use stitchline_core::{OrderId, OrderStatus};
use stitchline_storefront::db::OrderStore;
use stitchline_integration_tests::{TestApp, product, text_body};

/// An app with one pending order, id 1.
async fn app_with_pending_order() -> TestApp {
    let mut app = TestApp::start([product(1, "Product A", dec!(50.00))]).await;
    app.post_form("/cart/add", "product_id=1&size=M&quantity=2")
        .await;
    app.checkout().await;
    app
}

async fn status_of(app: &TestApp, id: i32) -> OrderStatus {
    app.orders
        .get_order(OrderId::new(id))
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_known_digest_is_accepted() {
    let app = app_with_pending_order().await;
    let body = r#"{"order_id":"1","payment_status":"finished"}"#;
    let digest = "2362aedff19fba323e1d4c9731b2c1e273316d572b2f1c5dd9fea6d1ed7d415436b81276961dea2310cbbe4e52d1d81477c52b61350493d0cca7ab4dada5f201";

    let response = app.webhook(body, Some(digest)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, 1).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected_without_mutation() {
    let app = app_with_pending_order().await;
    let body = r#"{"order_id":"1","payment_status":"finished"}"#;
    let forged = app.sign(r#"{"order_id":"1","payment_status":"waiting"}"#);

    let response = app.webhook(body, Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text_body(response).await, "Invalid signature");

    let response = app.webhook(body, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(status_of(&app, 1).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = app_with_pending_order().await;

    for body in ["", "{not json", r#"["order_id","1"]"#, r#"{"order_id":"1","fee":{"a":}}"#] {
        let response = app.webhook(body, Some("00")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?}");
    }
    assert_eq!(status_of(&app, 1).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_nested_fee_object_is_accepted() {
    let app = app_with_pending_order().await;
    let body = r#"{"order_id":"1","payment_status":"finished","payment_id":5077125051,"fee":{"currency":"btc","depositFee":0,"serviceFee":0,"withdrawalFee":0}}"#;
    let digest = "e817ca177cd4b8c6c9f5495dadc575e3f7038cd2a83a959157332971a0f1ca97e825bbd840bce0ee8875016fef97af5655825f2ee72e6e3467415b7daca2971b";

    let response = app.webhook(body, Some(digest)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let order = app
        .orders
        .get_order(OrderId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.gateway_reference_id.as_deref(), Some("5077125051"));
}

#[tokio::test]
async fn test_unknown_order_is_rejected() {
    let app = app_with_pending_order().await;
    let body = r#"{"order_id":"999","payment_status":"finished"}"#;
    let signature = app.sign(body);

    let response = app.webhook(body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text_body(response).await, "Unknown order");
}

#[tokio::test]
async fn test_signed_payload_missing_fields_is_rejected() {
    let app = app_with_pending_order().await;
    let body = r#"{"payment_status":"finished"}"#;
    let signature = app.sign(body);

    let response = app.webhook(body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_late_failure_does_not_regress_paid_order() {
    let app = app_with_pending_order().await;

    for status in ["waiting", "confirming", "finished", "failed", "expired"] {
        let body = format!(r#"{{"order_id":1,"payment_id":42,"payment_status":"{status}"}}"#);
        let signature = app.sign(&body);
        let response = app.webhook(&body, Some(&signature)).await;
        assert_eq!(response.status(), StatusCode::OK, "status {status}");
    }

    let order = app
        .orders
        .get_order(OrderId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid);
    assert_eq!(order.gateway_reference_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn test_expired_invoice_cancels_order() {
    let app = app_with_pending_order().await;
    let body = r#"{"order_id":"1","payment_status":"expired"}"#;
    let signature = app.sign(body);

    let response = app.webhook(body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, 1).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_uppercase_signature_is_accepted() {
    let app = app_with_pending_order().await;
    let body = r#"{"order_id":"1","payment_status":"confirmed"}"#;
    let signature = app.sign(body).to_ascii_uppercase();

    let response = app.webhook(body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, 1).await, OrderStatus::Paid);
}
