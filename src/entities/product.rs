use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. Image filenames are an ordered JSON list; every product
/// keeps at least one image. Helmets never carry a sound file.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub kind: ProductKind,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Json")]
    pub images: Json,
    pub featured: bool,
    pub stock: i32,
    pub sold: i32,
    #[sea_orm(nullable)]
    pub sound_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Ordered image filenames out of the JSON column.
    pub fn image_list(&self) -> Vec<String> {
        serde_json::from_value(self.images.clone()).unwrap_or_default()
    }
}

/// Product kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    #[sea_orm(string_value = "car")]
    Car,
    #[sea_orm(string_value = "helmet")]
    Helmet,
    #[sea_orm(string_value = "formula1")]
    Formula1,
}

impl std::str::FromStr for ProductKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "car" => Ok(ProductKind::Car),
            "helmet" => Ok(ProductKind::Helmet),
            "formula1" => Ok(ProductKind::Formula1),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProductKind::Car => "car",
            ProductKind::Helmet => "helmet",
            ProductKind::Formula1 => "formula1",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_only_the_fixed_enum() {
        assert_eq!("car".parse::<ProductKind>(), Ok(ProductKind::Car));
        assert_eq!("helmet".parse::<ProductKind>(), Ok(ProductKind::Helmet));
        assert_eq!("formula1".parse::<ProductKind>(), Ok(ProductKind::Formula1));
        assert!("bike".parse::<ProductKind>().is_err());
        assert!("Car".parse::<ProductKind>().is_err());
    }
}
