//! Cart workflow: merge semantics, ownership, clearing, and the
//! self-healing read.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use modelcar_api::entities::ProductKind;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn adding_the_same_product_merges_into_one_line() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Merge").await;
    let product = app
        .seed_product("F40", ProductKind::Car, dec!(1299.90), 10)
        .await;

    let payload = json!({ "product_id": product.id, "quantity": 2 });
    let response = app
        .request(Method::POST, "/api/users/cart", Some(payload.clone()), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::POST, "/api/users/cart", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let items = body["items"].as_array().expect("cart items");
    assert_eq!(items.len(), 1, "one line per product");
    assert_eq!(items[0]["quantity"], 4);
    assert_eq!(items[0]["product"]["id"], product.id.to_string());
}

#[tokio::test]
async fn quantity_defaults_to_one() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Default").await;
    let product = app
        .seed_product("250 GTO", ProductKind::Car, dec!(3500.00), 3)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/users/cart",
            Some(json!({ "product_id": product.id })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn adding_a_nonexistent_product_is_a_404() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Ghost").await;

    let response = app
        .request(
            Method::POST,
            "/api/users/cart",
            Some(json!({ "product_id": Uuid::new_v4(), "quantity": 1 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Product not found");
}

#[tokio::test]
async fn update_sets_the_exact_quantity_and_zero_removes() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Setter").await;
    let product = app
        .seed_product("SF90", ProductKind::Car, dec!(899.00), 10)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/users/cart",
            Some(json!({ "product_id": product.id, "quantity": 5 })),
            Some(&token),
        )
        .await;
    let body = response_json(response).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    // Set, not add
    let response = app
        .request(
            Method::PUT,
            &format!("/api/users/cart/{}", item_id),
            Some(json!({ "quantity": 2 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["items"][0]["quantity"], 2);

    // Zero removes the line
    let response = app
        .request(
            Method::PUT,
            &format!("/api/users/cart/{}", item_id),
            Some(json!({ "quantity": 0 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn another_users_line_id_reads_as_not_found() {
    let app = TestApp::new().await;
    let (token_a, _id_a) = app.register_user("Alice").await;
    let (token_b, _id_b) = app.register_user("Bruno").await;
    let product = app
        .seed_product("Testarossa", ProductKind::Car, dec!(450.00), 5)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/users/cart",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
            Some(&token_a),
        )
        .await;
    let body = response_json(response).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    for method in [Method::PUT, Method::DELETE] {
        let payload = (method == Method::PUT).then(|| json!({ "quantity": 3 }));
        let response = app
            .request(
                method.clone(),
                &format!("/api/users/cart/{}", item_id),
                payload,
                Some(&token_b),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", method);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Item not found in cart");
    }
}

#[tokio::test]
async fn clearing_the_cart_is_idempotent() {
    let app = TestApp::new().await;
    let (token, _user_id) = app.register_user("Cleaner").await;
    let product = app
        .seed_product("Enzo", ProductKind::Car, dec!(2100.00), 4)
        .await;

    app.request(
        Method::POST,
        "/api/users/cart",
        Some(json!({ "product_id": product.id, "quantity": 2 })),
        Some(&token),
    )
    .await;

    let response = app
        .request(Method::DELETE, "/api/users/cart/clear", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Clearing again still succeeds
    let response = app
        .request(Method::DELETE, "/api/users/cart/clear", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, "/api/users/cart", None, Some(&token))
        .await;
    let body = response_json(response).await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleted_products_vanish_from_the_cart_on_read() {
    let app = TestApp::new().await;
    let (token, user_id) = app.register_user("Healed").await;
    let keep = app
        .seed_product("LaFerrari", ProductKind::Car, dec!(5000.00), 2)
        .await;
    let doomed = app
        .seed_product("Doomed Helmet", ProductKind::Helmet, dec!(99.00), 20)
        .await;

    for product in [&keep, &doomed] {
        app.request(
            Method::POST,
            "/api/users/cart",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
            Some(&token),
        )
        .await;
    }

    // Remove the row directly, bypassing the catalog cascade, to leave a
    // dangling cart line behind.
    use sea_orm::EntityTrait;
    modelcar_api::entities::Product::delete_by_id(doomed.id)
        .exec(&*app.state.db)
        .await
        .expect("delete product row");

    let response = app
        .request(Method::GET, "/api/users/cart", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product"]["id"], keep.id.to_string());

    // The stale line is gone from storage too, not just the view
    let cart = app
        .state
        .services
        .cart
        .get_cart(user_id)
        .await
        .expect("reload cart");
    assert_eq!(cart.items.len(), 1);
}
