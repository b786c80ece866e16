use crate::{
    entities::{cart_item, CartItem, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Per-user shopping cart.
///
/// A cart holds at most one line per product: adding the same product again
/// merges into the existing line by incrementing its quantity. Stock is not
/// checked here; it is enforced only at order time.
///
/// Concurrent mutations of one user's cart are last-write-wins; this matches
/// the single-request model and is documented as a known limitation.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Adds a product to the cart, merging into an existing line when the
    /// product is already there.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        if let Some(line) = existing {
            let merged = line.quantity + quantity;
            let mut line: cart_item::ActiveModel = line.into();
            line.quantity = Set(merged);
            line.updated_at = Set(Utc::now());
            line.update(&txn).await?;
        } else {
            let line = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            line.insert(&txn).await?;
        }

        let view = self.load_cart(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id,
            })
            .await;

        info!(%user_id, %product_id, quantity, product = %product.name, "Added product to cart");
        Ok(view)
    }

    /// Sets a line's quantity to exactly the given value; zero or negative
    /// removes the line. 404 when the line is not in this user's cart, so
    /// other users' line ids are indistinguishable from nonexistent ones.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let line = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not found in cart".to_string()))?;

        if quantity <= 0 {
            line.delete(&txn).await?;
        } else {
            let mut line: cart_item::ActiveModel = line.into();
            line.quantity = Set(quantity);
            line.updated_at = Set(Utc::now());
            line.update(&txn).await?;
        }

        let view = self.load_cart(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                user_id,
                cart_item_id: item_id,
            })
            .await;

        Ok(view)
    }

    /// Removes a line from the cart, under the same ownership rule as
    /// [`CartService::update_item`].
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let line = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not found in cart".to_string()))?;

        line.delete(&txn).await?;

        let view = self.load_cart(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                user_id,
                cart_item_id: item_id,
            })
            .await;

        Ok(view)
    }

    /// Empties the cart. Idempotent; clearing an empty cart succeeds.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartCleared(user_id))
            .await;

        info!(%user_id, "Cleared cart");
        Ok(())
    }

    /// Returns the cart with each line's product resolved. Lines whose
    /// product has been deleted are dropped from the persisted cart as well
    /// as the returned view (self-healing read).
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let view = self.load_cart(&txn, user_id).await?;
        txn.commit().await?;
        Ok(view)
    }

    /// Loads the cart inside an existing connection/transaction, pruning
    /// lines whose product no longer exists.
    pub(crate) async fn load_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            match Product::find_by_id(line.product_id).one(conn).await? {
                Some(product) => items.push(CartLine {
                    id: line.id,
                    quantity: line.quantity,
                    product,
                }),
                None => {
                    // Product was deleted since the line was added.
                    line.delete(conn).await?;
                }
            }
        }

        Ok(CartView { items })
    }
}

/// One resolved cart line for API responses.
#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub quantity: i32,
    pub product: ProductModel,
}

/// A user's cart with every line's product populated.
#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
}

impl CartView {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
