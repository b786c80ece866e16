use crate::handlers::common::{created_response, map_service_error, parse_id, success_response};
use crate::{auth::CurrentUser, errors::ApiError, AppState};
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use std::sync::Arc;

/// Order endpoints, nested under `/api/users`. All owner-scoped; the caller
/// mounts these behind the auth gate.
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:order_id", get(get_order))
}

/// Place an order from the current cart
async fn create_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .create_order(&user)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}

/// The current user's orders, newest first
async fn list_orders(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let orders = state
        .services
        .orders
        .get_orders(user.id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(orders))
}

/// One order by id, scoped to its owner
async fn get_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order_id = parse_id(&order_id)?;
    let order = state
        .services
        .orders
        .get_order(user.id, order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}
