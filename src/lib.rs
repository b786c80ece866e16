//! Modelcar API Library
//!
//! Backend for a Ferrari model-car storefront: user accounts with JWT auth,
//! an admin-managed product catalog with image and engine-sound uploads,
//! per-user carts, and transactional checkout.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod request_id;
pub mod services;
pub mod storage;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::get,
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Shared application state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<auth::AuthService>,
    pub storage: storage::AssetStorage,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let storage = storage::AssetStorage::new(config.public_dir.clone());
        let auth = Arc::new(auth::AuthService::new(
            config.jwt_secret.clone(),
            config.jwt_expiration_days,
            db.clone(),
        ));
        let services = handlers::AppServices::new(db.clone(), storage.clone(), event_sender.clone());

        Self {
            db,
            config,
            auth,
            storage,
            event_sender,
            services,
        }
    }
}

/// The full `/api` surface.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/users", handlers::users::users_routes())
        .nest("/products", handlers::products::products_routes())
}

/// Builds the application router with every route and the common middleware
/// stack. CORS is environment-specific and layered on by the caller.
pub fn app_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.config.max_body_size;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .nest_service("/public", ServeDir::new(state.storage.root()))
        .layer(Extension(state.auth.clone()))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(axum::middleware::from_fn(
            request_id::request_id_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness message at the root
async fn index() -> Json<Value> {
    Json(json!({
        "name": "Modelcar Storefront API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Health report with a database ping
async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": db_status,
        "database": db_status,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
