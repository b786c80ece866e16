use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shop account. Address and payment method live as nullable JSON value
/// objects on the row; cart lines and orders are owned child tables.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub phone: String,
    #[sea_orm(unique)]
    pub cpf: String,
    pub password_hash: String,
    pub admin: bool,
    #[sea_orm(nullable)]
    pub image: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub address: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub payment_method: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Saved shipping address, if the column holds a well-formed one.
    pub fn address(&self) -> Option<Address> {
        self.address
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Saved payment method, if the column holds a well-formed one.
    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

/// Shipping address value object, stored as JSON on the user row and
/// snapshot into orders at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// Card kind accepted at checkout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Credit,
    Debit,
}

/// Payment instrument value object. The cvv is kept in storage because
/// checkout snapshots the full instrument; API responses strip it via
/// [`PaymentMethod::summary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub kind: PaymentKind,
    pub card_number: String,
    pub card_holder_name: String,
    pub expiration_date: String,
    pub cvv: String,
}

/// Payment method with the cvv removed, safe to echo back to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSummary {
    pub kind: PaymentKind,
    pub card_number: String,
    pub card_holder_name: String,
    pub expiration_date: String,
}

impl PaymentMethod {
    pub fn summary(&self) -> PaymentMethodSummary {
        PaymentMethodSummary {
            kind: self.kind,
            card_number: self.card_number.clone(),
            card_holder_name: self.card_holder_name.clone(),
            expiration_date: self.expiration_date.clone(),
        }
    }
}
