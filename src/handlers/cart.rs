use crate::handlers::common::{
    map_service_error, no_content_response, parse_id, success_response, validate_input,
};
use crate::{auth::CurrentUser, errors::ApiError, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Cart endpoints, nested under `/api/users`. All owner-scoped; the caller
/// mounts these behind the auth gate.
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(get_cart).post(add_to_cart))
        .route("/cart/clear", delete(clear_cart))
        .route("/cart/:item_id", put(update_item).delete(remove_item))
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
struct AddToCartRequest {
    product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

/// The current user's cart with products resolved
async fn get_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(user.id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Add a product to the cart, merging into an existing line
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_item(user.id, payload.product_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Set a line's quantity; zero or below removes the line
async fn update_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<String>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let item_id = parse_id(&item_id)?;
    let cart = state
        .services
        .cart
        .update_item(user.id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Remove a line from the cart
async fn remove_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let item_id = parse_id(&item_id)?;
    let cart = state
        .services
        .cart
        .remove_item(user.id, item_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Empty the cart; succeeds even when already empty
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .clear(user.id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
