use crate::{
    entities::{cart_item, product, CartItem, Product, ProductKind, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::UploadFile,
    storage::{AssetKind, AssetStorage},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Product catalog: admin-managed CRUD plus the public, side-effect-free
/// read surface. Asset files (images, engine sounds) are tracked on the
/// product row and deleted best-effort when the row mutation drops them.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    storage: AssetStorage,
    event_sender: EventSender,
}

/// Fields accepted when creating a product. Uploaded files travel separately.
#[derive(Clone, Debug)]
pub struct CreateProductInput {
    pub name: String,
    pub description: String,
    pub kind: ProductKind,
    pub price: Decimal,
    pub featured: bool,
    pub stock: i32,
}

/// Partial update: only supplied fields change.
#[derive(Clone, Debug, Default)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<ProductKind>,
    pub price: Option<Decimal>,
    pub featured: Option<bool>,
    pub stock: Option<i32>,
}

/// Result of an update: the record plus a user-facing message that notes
/// side effects such as the automatic sound removal on a kind change.
#[derive(Clone, Debug)]
pub struct UpdateOutcome {
    pub product: ProductModel,
    pub message: String,
}

impl CatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: AssetStorage,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            storage,
            event_sender,
        }
    }

    /// Creates a product. Requires at least one image; a sound file is only
    /// accepted for kinds other than helmet.
    #[instrument(skip(self, images, sound))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
        images: Vec<UploadFile>,
        sound: Option<UploadFile>,
    ) -> Result<ProductModel, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "The name field is required".to_string(),
            ));
        }
        if input.description.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "The description field is required".to_string(),
            ));
        }
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "The price cannot be negative".to_string(),
            ));
        }
        if input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "The stock cannot be negative".to_string(),
            ));
        }
        if images.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one image is required".to_string(),
            ));
        }
        if sound.is_some() && input.kind == ProductKind::Helmet {
            return Err(ServiceError::ValidationError(
                "Helmets cannot have a sound file".to_string(),
            ));
        }

        self.ensure_unique_name(&input.name, None).await?;

        let mut image_names = Vec::with_capacity(images.len());
        for upload in &images {
            let name = self
                .storage
                .save(AssetKind::ProductImage, &upload.filename, &upload.data)
                .await?;
            image_names.push(name);
        }

        let sound_file = match sound {
            Some(upload) => Some(
                self.storage
                    .save(AssetKind::Sound, &upload.filename, &upload.data)
                    .await?,
            ),
            None => None,
        };

        let product_id = Uuid::new_v4();
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            kind: Set(input.kind),
            price: Set(input.price),
            images: Set(serde_json::json!(image_names)),
            featured: Set(input.featured),
            stock: Set(input.stock),
            sold: Set(0),
            sound_file: Set(sound_file),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(%product_id, name = %created.name, "Created product");
        Ok(created)
    }

    /// Partial update. New images are appended, never replacing the list; a
    /// new sound (kind permitting) replaces the old one and deletes its
    /// asset. Switching kind to helmet drops the sound asset and the success
    /// message carries a note about it. A sound uploaded for a helmet is
    /// silently ignored.
    #[instrument(skip(self, images, sound))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
        images: Vec<UploadFile>,
        sound: Option<UploadFile>,
    ) -> Result<UpdateOutcome, ServiceError> {
        let existing = self.get(id).await?;

        if let Some(ref name) = input.name {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "The name field is required".to_string(),
                ));
            }
            if name.trim() != existing.name {
                self.ensure_unique_name(name, Some(id)).await?;
            }
        }
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "The price cannot be negative".to_string(),
                ));
            }
        }
        if let Some(stock) = input.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "The stock cannot be negative".to_string(),
                ));
            }
        }

        let new_kind = input.kind.unwrap_or(existing.kind);
        let changing_to_helmet = new_kind == ProductKind::Helmet
            && existing.kind != ProductKind::Helmet
            && existing.sound_file.is_some();

        // Assets to delete after the row update succeeds.
        let mut stale_sounds: Vec<String> = Vec::new();

        let mut sound_file = existing.sound_file.clone();
        if changing_to_helmet {
            if let Some(old) = sound_file.take() {
                stale_sounds.push(old);
            }
        }

        let mut image_names = existing.image_list();
        for upload in &images {
            let name = self
                .storage
                .save(AssetKind::ProductImage, &upload.filename, &upload.data)
                .await?;
            image_names.push(name);
        }

        if let Some(upload) = sound {
            if new_kind != ProductKind::Helmet {
                let name = self
                    .storage
                    .save(AssetKind::Sound, &upload.filename, &upload.data)
                    .await?;
                if let Some(old) = sound_file.replace(name) {
                    stale_sounds.push(old);
                }
            }
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(kind) = input.kind {
            active.kind = Set(kind);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(featured) = input.featured {
            active.featured = Set(featured);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
        }
        active.images = Set(serde_json::json!(image_names));
        active.sound_file = Set(sound_file);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        for stale in stale_sounds {
            self.storage.delete(AssetKind::Sound, &stale).await;
        }

        self.event_sender.send_or_log(Event::ProductUpdated(id)).await;

        let mut message = "Product updated successfully".to_string();
        if changing_to_helmet {
            message.push_str(". Sound file removed automatically (helmets have no engine sound)");
        }

        info!(product_id = %id, "Updated product");
        Ok(UpdateOutcome {
            product: updated,
            message,
        })
    }

    /// Removes one image from a product. Every product keeps at least one
    /// image, so removing the last one fails.
    #[instrument(skip(self))]
    pub async fn remove_image(
        &self,
        id: Uuid,
        filename: &str,
    ) -> Result<ProductModel, ServiceError> {
        let existing = self.get(id).await?;
        let mut image_names = existing.image_list();

        if !image_names.iter().any(|name| name == filename) {
            return Err(ServiceError::NotFound("Image not found".to_string()));
        }
        if image_names.len() == 1 {
            return Err(ServiceError::ValidationError(
                "The product must keep at least one image".to_string(),
            ));
        }

        image_names.retain(|name| name != filename);

        let mut active: product::ActiveModel = existing.into();
        active.images = Set(serde_json::json!(image_names));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.storage.delete(AssetKind::ProductImage, filename).await;
        self.event_sender.send_or_log(Event::ProductUpdated(id)).await;

        Ok(updated)
    }

    /// Clears a product's sound file and deletes the asset. 404 when the
    /// product has no sound.
    #[instrument(skip(self))]
    pub async fn remove_sound(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        let existing = self.get(id).await?;

        let filename = existing
            .sound_file
            .clone()
            .ok_or_else(|| ServiceError::NotFound("Product has no sound file".to_string()))?;

        let mut active: product::ActiveModel = existing.into();
        active.sound_file = Set(None);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.storage.delete(AssetKind::Sound, &filename).await;
        self.event_sender.send_or_log(Event::ProductUpdated(id)).await;

        Ok(updated)
    }

    /// Deletes a product. Inside one transaction the product is stripped
    /// from every user's cart and the row removed; asset files are then
    /// deleted best-effort. Historical orders keep their reference and
    /// render the line as unavailable.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get(id).await?;
        let image_names = existing.image_list();
        let sound_file = existing.sound_file.clone();

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        Product::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        for filename in image_names {
            self.storage.delete(AssetKind::ProductImage, &filename).await;
        }
        if let Some(filename) = sound_file {
            self.storage.delete(AssetKind::Sound, &filename).await;
        }

        self.event_sender.send_or_log(Event::ProductDeleted(id)).await;

        info!(product_id = %id, "Deleted product");
        Ok(())
    }

    /// All products, newest first.
    pub async fn list(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Featured products, newest first.
    pub async fn list_featured(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Featured.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Products of one kind, newest first.
    pub async fn list_by_kind(&self, kind: ProductKind) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Kind.eq(kind))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Case-insensitive substring search over name and description, newest
    /// first. Lowering both sides keeps the behavior identical across the
    /// sqlite and postgres backends.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<ProductModel>, ServiceError> {
        let term = query.trim();
        if term.is_empty() {
            return Err(ServiceError::ValidationError(
                "Search term not provided".to_string(),
            ));
        }

        let pattern = format!("%{}%", term.to_lowercase().replace('%', "\\%"));

        Ok(Product::find()
            .filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(product::Column::Name)))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(product::Column::Description)))
                            .like(pattern),
                    ),
            )
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Product::find().filter(product::Column::Name.eq(name.trim()));
        if let Some(id) = exclude_id {
            query = query.filter(product::Column::Id.ne(id));
        }

        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::ValidationError(
                "A product with this name already exists".to_string(),
            ));
        }
        Ok(())
    }
}
