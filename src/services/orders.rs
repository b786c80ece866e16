use crate::{
    entities::{
        order, order_item, Address, CartItem, Order, OrderItem, PaymentMethodSummary, Product,
        UserModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::CartService,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Checkout and order history.
///
/// Placing an order runs in a single transaction: it reads the cart, writes
/// the order and its lines, adjusts stock and sold counters, and empties the
/// cart. Either all of it happens or none of it does.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    carts: CartService,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, carts: CartService, event_sender: EventSender) -> Self {
        Self {
            db,
            carts,
            event_sender,
        }
    }

    /// Places an order from the user's current cart.
    ///
    /// Preconditions: non-empty cart, saved shipping address, saved payment
    /// method. The order snapshots the address and the full payment
    /// instrument as JSON; the returned view (like every API response)
    /// carries the payment method without its cvv.
    ///
    /// Stock is decremented with a floor of zero and sold incremented by the
    /// ordered quantity. Ordering is allowed even when stock is short.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn create_order(&self, user: &UserModel) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;

        // Precondition order is part of the contract: empty cart wins over a
        // missing address, which wins over a missing payment method.
        let cart = self.carts.load_cart(&txn, user.id).await?;
        if cart.is_empty() {
            return Err(ServiceError::ValidationError(
                "Your cart is empty. Add products before placing an order".to_string(),
            ));
        }
        let address = user.address().ok_or_else(|| {
            ServiceError::ValidationError(
                "Add a shipping address before placing an order".to_string(),
            )
        })?;
        let payment_method = user.payment_method().ok_or_else(|| {
            ServiceError::ValidationError(
                "Add a payment method before placing an order".to_string(),
            )
        })?;

        let total_price: Decimal = cart
            .items
            .iter()
            .map(|line| line.product.price * Decimal::from(line.quantity))
            .sum();

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order_row = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user.id),
            total_price: Set(total_price),
            payment_method: Set(serde_json::to_value(&payment_method)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            shipping_address: Set(serde_json::to_value(&address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            created_at: Set(now),
        };
        order_row.insert(&txn).await?;

        for line in &cart.items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.id),
                quantity: Set(line.quantity),
                created_at: Set(now),
            };
            item.insert(&txn).await?;

            let mut product: crate::entities::product::ActiveModel = line.product.clone().into();
            product.stock = Set(clamped_stock(line.product.stock, line.quantity));
            product.sold = Set(line.product.sold + line.quantity);
            product.updated_at = Set(now);
            product.update(&txn).await?;
        }

        CartItem::delete_many()
            .filter(crate::entities::cart_item::Column::UserId.eq(user.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        info!(%order_id, %total_price, lines = cart.items.len(), "Order placed");
        self.get_order(user.id, order_id).await
    }

    /// The user's orders, newest first, each with its lines resolved.
    #[instrument(skip(self))]
    pub async fn get_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.build_view(order).await?);
        }
        Ok(views)
    }

    /// One order by id, scoped to its owner. Another user's order id yields
    /// the same 404 as a nonexistent one.
    #[instrument(skip(self))]
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        self.build_view(order).await
    }

    async fn build_view(&self, order: order::Model) -> Result<OrderView, ServiceError> {
        let lines = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = match Product::find_by_id(line.product_id).one(&*self.db).await? {
                Some(product) => OrderLineView {
                    id: line.id,
                    product_id: line.product_id,
                    images: product.image_list(),
                    name: product.name,
                    price: product.price,
                    quantity: line.quantity,
                    unavailable: false,
                },
                None => OrderLineView {
                    id: line.id,
                    product_id: line.product_id,
                    name: "Product no longer available".to_string(),
                    price: Decimal::ZERO,
                    images: Vec::new(),
                    quantity: line.quantity,
                    unavailable: true,
                },
            };
            items.push(item);
        }

        let payment_method: Option<crate::entities::PaymentMethod> =
            serde_json::from_value(order.payment_method.clone()).ok();
        let shipping_address: Option<Address> =
            serde_json::from_value(order.shipping_address.clone()).ok();

        Ok(OrderView {
            id: order.id,
            total_price: order.total_price,
            payment_method: payment_method.map(|pm| pm.summary()),
            shipping_address,
            items,
            created_at: order.created_at,
        })
    }
}

/// Stock after an order of `quantity` units, floored at zero.
fn clamped_stock(stock: i32, quantity: i32) -> i32 {
    (stock - quantity).max(0)
}

/// One order line as shown to the client. Product data is read live; when
/// the product has been deleted the line stays, flagged unavailable with
/// placeholder fields.
#[derive(Clone, Debug, Serialize)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub images: Vec<String>,
    pub quantity: i32,
    pub unavailable: bool,
}

/// A placed order for API responses. The payment method is the snapshot
/// taken at checkout, minus the cvv.
#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub total_price: Decimal,
    pub payment_method: Option<PaymentMethodSummary>,
    pub shipping_address: Option<Address>,
    pub items: Vec<OrderLineView>,
    pub created_at: DateTime<Utc>,
}
