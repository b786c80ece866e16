pub mod cart;
pub mod common;
pub mod orders;
pub mod products;
pub mod users;

use crate::{
    events::EventSender,
    services::{CartService, CatalogService, OrderService, UserService},
    storage::AssetStorage,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Every service the handlers reach through application state.
#[derive(Clone)]
pub struct AppServices {
    pub users: UserService,
    pub catalog: CatalogService,
    pub cart: CartService,
    pub orders: OrderService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: AssetStorage,
        event_sender: EventSender,
    ) -> Self {
        let cart = CartService::new(db.clone(), event_sender.clone());
        Self {
            users: UserService::new(db.clone(), storage.clone(), event_sender.clone()),
            catalog: CatalogService::new(db.clone(), storage.clone(), event_sender.clone()),
            orders: OrderService::new(db, cart.clone(), event_sender),
            cart,
        }
    }
}
