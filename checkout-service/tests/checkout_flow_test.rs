mod common;

use chrono::{Duration, Utc};
use checkout_service::{Application, Collaborators};
use common::{cart_line, test_config, trip_date, TestApp};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn body(response: reqwest::Response) -> Value {
    response.json().await.expect("Failed to parse JSON")
}

fn lunch_cart() -> Value {
    json!([{
        "productId": "farm",
        "productName": "Farm visit",
        "vendorName": "Green Farm",
        "salePrice": 10000,
        "participants": 2,
        "reservationDate": trip_date().to_string(),
        "reservationTime": "10:30",
        "options": [{ "optionId": "lunch", "name": "Lunch box", "price": 1000, "quantity": 1 }]
    }])
}

#[tokio::test]
async fn cart_to_confirmed_reservation() {
    let app = TestApp::spawn().await;

    let order = app.place_order(lunch_cart()).await;
    assert_eq!(order["amount"], 21000);
    assert_eq!(order["goodsName"], "Farm visit");
    assert_eq!(order["returnUrl"], "http://shop.test/payments/callback");
    let order_id = order["orderId"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("ORD-"));

    let status = body(app.order_status(&order_id).await).await;
    assert_eq!(status["state"], "AWAITING_REDIRECT");

    // Customer finishes the hosted flow; the provider knows the authorization.
    app.gateway.authorize("T-21000", &order_id, 21_000);

    let response = app
        .approve(json!({ "tid": "T-21000", "amount": 21000, "orderId": order_id }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body_json = body(response).await;
    assert_eq!(body_json["success"], true);
    assert_eq!(body_json["data"]["amount"], 21000);
    assert_eq!(body_json["data"]["reservationsMaterialized"], true);

    let reservations = app.reservations.reservations_for(&order_id);
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].participants, 2);
    assert_eq!(reservations[0].amount, 21_000);

    let status = body(app.order_status(&order_id).await).await;
    assert_eq!(status["state"], "APPROVED");
    assert_eq!(status["result"]["outcome"], "APPROVED");
}

#[tokio::test]
async fn repeated_approval_confirms_once() {
    let app = TestApp::spawn().await;
    let order = app.place_order(lunch_cart()).await;
    let order_id = order["orderId"].as_str().unwrap().to_string();
    app.gateway.authorize("T1", &order_id, 21_000);

    let request = json!({ "tid": "T1", "amount": 21000, "orderId": order_id });
    let first = body(app.approve(request.clone()).await).await;
    let second = body(app.approve(request.clone()).await).await;
    let concurrent = futures::future::join_all((0..4).map(|_| app.approve(request.clone()))).await;

    assert_eq!(first, second);
    for response in concurrent {
        assert_eq!(body(response).await, first);
    }
    assert_eq!(app.gateway.approve_calls(), 1);
    assert_eq!(app.reservations.confirmations(&order_id), 1);
    assert_eq!(app.reservations.len(), 1);
}

#[tokio::test]
async fn decline_is_final() {
    let app = TestApp::spawn().await;
    let order = app.place_order(lunch_cart()).await;
    let order_id = order["orderId"].as_str().unwrap().to_string();
    app.gateway.authorize("T1", &order_id, 5_000);

    let request = json!({ "tid": "T1", "amount": 21000, "orderId": order_id });
    let first = body(app.approve(request.clone()).await).await;
    assert_eq!(first["success"], false);
    assert_eq!(first["code"], "A245");

    // Even if the provider would now accept, the stored decline stands.
    app.gateway.authorize("T1", &order_id, 21_000);
    let second = body(app.approve(request).await).await;
    assert_eq!(second, first);
    assert_eq!(app.gateway.approve_calls(), 1);

    let status = body(app.order_status(&order_id).await).await;
    assert_eq!(status["state"], "DECLINED");
}

#[tokio::test]
async fn re_adding_a_product_replaces_its_line() {
    let app = TestApp::spawn().await;

    let order = app
        .place_order(json!([
            cart_line("farm", 10_000, 2),
            cart_line("museum", 3_000, 6),
            cart_line("farm", 10_000, 3),
        ]))
        .await;

    assert_eq!(order["amount"], 48000);
    assert_eq!(order["goodsName"], "Program farm and 1 more");
}

#[tokio::test]
async fn empty_cart_is_unprocessable() {
    let app = TestApp::spawn().await;

    let response = app.create_order(json!([])).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.orders.is_empty());
}

#[tokio::test]
async fn zero_participants_fail_validation() {
    let app = TestApp::spawn().await;

    let response = app.create_order(json!([cart_line("farm", 10_000, 0)])).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn participant_bounds_are_enforced() {
    let app = TestApp::spawn().await;

    let response = app.create_order(json!([cart_line("museum", 3_000, 4)])).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("between 5 and 30 participants"));
}

#[tokio::test]
async fn booking_window_comes_from_policy() {
    let app = TestApp::spawn().await;
    app.policy.set_rows(&[("advance_booking_days", "7")]);

    // Default trip date is two weeks out, beyond a 7-day window.
    let response = app.create_order(json!([cart_line("farm", 10_000, 2)])).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut near = cart_line("farm", 10_000, 2);
    near["reservationDate"] = json!((Utc::now() + Duration::days(3)).date_naive().to_string());
    let response = app.create_order(json!([near])).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_order_status_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.order_status("ORD-0-000000000000").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn one_payment_confirms_one_order() {
    let app = TestApp::spawn().await;
    let order_a = app.place_order(lunch_cart()).await;
    let order_b = app.place_order(lunch_cart()).await;
    let a = order_a["orderId"].as_str().unwrap().to_string();
    let b = order_b["orderId"].as_str().unwrap().to_string();
    // Only order B was paid for.
    app.gateway.authorize("T-B", &b, 21_000);

    let hijack = body(app.approve(json!({ "tid": "T-B", "amount": 21000, "orderId": a })).await).await;
    assert_eq!(hijack["success"], false);
    assert_eq!(hijack["code"], "ORDER_MISMATCH");

    let owner = body(app.approve(json!({ "tid": "T-B", "amount": 21000, "orderId": b })).await).await;
    assert_eq!(owner["success"], true);

    let retry = app
        .approve(json!({ "tid": "T-B", "amount": 21000, "orderId": a }))
        .await;
    assert_eq!(retry.status(), StatusCode::BAD_REQUEST);

    assert!(app.reservations.reservations_for(&a).is_empty());
    assert_eq!(app.reservations.reservations_for(&b).len(), 1);
}

#[tokio::test]
async fn memory_backend_takes_orders_from_configured_catalog() {
    let mut config = test_config("http://unused");
    config.storage.memory_products = "farm:1:40, museum:5:30".to_string();
    let collaborators = Collaborators::in_memory(&config).expect("Failed to wire collaborators");
    let app = Application::with_collaborators(config, collaborators)
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", app.http_port());
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let response = reqwest::Client::new()
        .post(format!("{}/checkout/orders", address))
        .json(&json!({ "items": [cart_line("farm", 10_000, 2)] }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body(response).await["amount"], 20000);
}
