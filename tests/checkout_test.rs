//! Checkout: precondition ordering, snapshotting, stock accounting, and the
//! order history reads.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, response_json, TestApp};
use modelcar_api::entities::ProductKind;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn checkout_preconditions_fail_in_a_fixed_order() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Eager").await;

    // Empty cart wins over everything
    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(
        body["message"],
        "Your cart is empty. Add products before placing an order"
    );

    let product = app
        .seed_product("F40 Replica", ProductKind::Car, dec!(100.00), 10)
        .await;
    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": product.id, "quantity": 1 })),
        Some(&token),
    )
    .await;

    // Cart filled, but no address yet
    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(
        body["message"],
        "Add a shipping address before placing an order"
    );

    let address = json!({
        "street": "Via Emilia",
        "number": "1",
        "neighborhood": "Centro",
        "city": "Modena",
        "state": "MO",
        "zip_code": "41100",
    });
    app.request(Method::PUT, "/api/users/address", Some(address), Some(&token))
        .await;

    // Address saved, payment method still missing
    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(
        body["message"],
        "Add a payment method before placing an order"
    );
}

#[tokio::test]
async fn successful_checkout_totals_snapshots_and_empties_the_cart() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Buyer").await;
    app.complete_checkout_profile(&token).await;

    let car = app
        .seed_product("288 GTO", ProductKind::Car, dec!(1250.50), 5)
        .await;
    let helmet = app
        .seed_product("Replica Helmet", ProductKind::Helmet, dec!(80.00), 3)
        .await;

    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": car.id, "quantity": 2 })),
        Some(&token),
    )
    .await;
    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": helmet.id, "quantity": 1 })),
        Some(&token),
    )
    .await;

    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;

    // total = 2 * 1250.50 + 80.00
    assert_eq!(money(&body["total_price"]), 2581.0);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["shipping_address"]["city"], "Maranello");

    // The payment snapshot comes back without its cvv
    assert_eq!(body["payment_method"]["card_number"], "4111111111111111");
    assert!(body["payment_method"].get("cvv").is_none());

    // Stock decremented, sold incremented
    let car_after = app.state.services.catalog.get(car.id).await.unwrap();
    assert_eq!(car_after.stock, 3);
    assert_eq!(car_after.sold, 2);

    // Cart emptied
    let response = app
        .request(Method::GET, "/api/users/cart", None, Some(&token))
        .await;
    let cart = response_json(response).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ordering_more_than_stock_floors_at_zero() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Greedy").await;
    app.complete_checkout_profile(&token).await;

    let product = app
        .seed_product("Limited F50", ProductKind::Car, dec!(999.00), 2)
        .await;
    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": product.id, "quantity": 5 })),
        Some(&token),
    )
    .await;

    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let after = app.state.services.catalog.get(product.id).await.unwrap();
    assert_eq!(after.stock, 0, "stock never goes negative");
    assert_eq!(after.sold, 5);
}

#[tokio::test]
async fn order_history_survives_product_deletion() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Archivist").await;
    app.complete_checkout_profile(&token).await;

    let product = app
        .seed_product("Dino 246", ProductKind::Car, dec!(300.00), 10)
        .await;
    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": product.id, "quantity": 1 })),
        Some(&token),
    )
    .await;
    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token))
        .await;
    let order = response_json(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    app.state
        .services
        .catalog
        .delete_product(product.id)
        .await
        .expect("delete product");

    let response = app
        .request(
            Method::GET,
            &format!("/api/users/orders/{}", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let item = &body["items"][0];
    assert_eq!(item["unavailable"], true);
    assert_eq!(item["name"], "Product no longer available");
    assert_eq!(money(&item["price"]), 0.0);
    assert!(item["images"].as_array().unwrap().is_empty());
    // The order total keeps its checkout-time value
    assert_eq!(money(&body["total_price"]), 300.0);
}

#[tokio::test]
async fn orders_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let (token_a, _id_a) = app.register_user("Owner").await;
    let (token_b, _id_b) = app.register_user("Snoop").await;
    app.complete_checkout_profile(&token_a).await;

    let product = app
        .seed_product("F355", ProductKind::Car, dec!(420.00), 5)
        .await;
    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": product.id, "quantity": 1 })),
        Some(&token_a),
    )
    .await;
    let response = app
        .request(Method::POST, "/api/users/orders", None, Some(&token_a))
        .await;
    let order = response_json(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/users/orders/{}", order_id),
            None,
            Some(&token_b),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A random id reads the same way
    let response = app
        .request(
            Method::GET,
            &format!("/api/users/orders/{}", Uuid::new_v4()),
            None,
            Some(&token_b),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The owner's listing shows exactly one order
    let response = app
        .request(Method::GET, "/api/users/orders", None, Some(&token_a))
        .await;
    let body = response_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let response = app
        .request(Method::GET, "/api/users/orders", None, Some(&token_b))
        .await;
    let body = response_json(response).await;
    assert!(body.as_array().unwrap().is_empty());
}
