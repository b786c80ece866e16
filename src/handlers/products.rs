use crate::handlers::common::{
    created_response, map_service_error, no_content_response, parse_id, success_response,
};
use crate::{
    auth::AdminUser,
    entities::ProductKind,
    errors::ApiError,
    services::catalog::{CreateProductInput, UpdateProductInput},
    services::UploadFile,
    AppState,
};
use axum::{
    extract::{Json, Multipart, Path, Query, State},
    routing::{delete, get, patch},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every upload beyond this count is rejected up front.
const MAX_IMAGES_PER_UPLOAD: usize = 10;

/// Routes under `/api/products`. Reads are public; every mutation requires
/// an admin, enforced by the [`AdminUser`] extractor because the mutating
/// methods share their paths with public ones.
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/featured", get(list_featured))
        .route("/type/:kind", get(list_by_kind))
        .route("/search", get(search_products))
        .route(
            "/:id",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/:id/remove-image", patch(remove_image))
        .route("/:id/remove-sound", delete(remove_sound))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoveImageRequest {
    filename: String,
}

#[derive(Debug, Serialize)]
struct ProductMessageResponse<T: Serialize> {
    message: String,
    product: T,
}

/// All products, newest first
async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

/// Featured products only
async fn list_featured(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_featured()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

/// Products of one kind
async fn list_by_kind(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let kind: ProductKind = kind
        .parse()
        .map_err(|_| ApiError::ValidationError(format!("Invalid product type: {}", kind)))?;
    let products = state
        .services
        .catalog
        .list_by_kind(kind)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

/// Case-insensitive substring search over name and description
async fn search_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .search(params.q.as_deref().unwrap_or(""))
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

/// One product by id
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let product = state
        .services
        .catalog
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

/// Create a product from a multipart form, admin only
async fn create_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let form = read_product_multipart(multipart).await?;

    let kind = form
        .kind
        .ok_or_else(|| ApiError::ValidationError("The kind field is required".to_string()))?;
    let price = form
        .price
        .ok_or_else(|| ApiError::ValidationError("The price field is required".to_string()))?;

    let product = state
        .services
        .catalog
        .create_product(
            CreateProductInput {
                name: form.name.unwrap_or_default(),
                description: form.description.unwrap_or_default(),
                kind,
                price,
                featured: form.featured.unwrap_or(false),
                stock: form.stock.unwrap_or(0),
            },
            form.images,
            form.sound,
        )
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ProductMessageResponse {
        message: "Product created successfully".to_string(),
        product,
    }))
}

/// Partially update a product from a multipart form, admin only
async fn update_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let form = read_product_multipart(multipart).await?;

    let outcome = state
        .services
        .catalog
        .update_product(
            id,
            UpdateProductInput {
                name: form.name,
                description: form.description,
                kind: form.kind,
                price: form.price,
                featured: form.featured,
                stock: form.stock,
            },
            form.images,
            form.sound,
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductMessageResponse {
        message: outcome.message,
        product: outcome.product,
    }))
}

/// Remove one image from a product, admin only
async fn remove_image(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<RemoveImageRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let product = state
        .services
        .catalog
        .remove_image(id, &payload.filename)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ProductMessageResponse {
        message: "Image removed successfully".to_string(),
        product,
    }))
}

/// Clear a product's sound file, admin only
async fn remove_sound(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let product = state
        .services
        .catalog
        .remove_sound(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ProductMessageResponse {
        message: "Sound file removed successfully".to_string(),
        product,
    }))
}

/// Delete a product and strip it from every cart, admin only
async fn delete_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    state
        .services
        .catalog
        .delete_product(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Text and file parts of the product multipart form.
#[derive(Debug, Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<String>,
    kind: Option<ProductKind>,
    price: Option<Decimal>,
    featured: Option<bool>,
    stock: Option<i32>,
    images: Vec<UploadFile>,
    sound: Option<UploadFile>,
}

async fn read_product_multipart(mut multipart: Multipart) -> Result<ProductForm, ApiError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::ValidationError(format!("Invalid multipart payload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" => {
                if form.images.len() >= MAX_IMAGES_PER_UPLOAD {
                    return Err(ApiError::ValidationError(format!(
                        "At most {} images per upload",
                        MAX_IMAGES_PER_UPLOAD
                    )));
                }
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::ValidationError(format!("Invalid multipart payload: {}", e))
                })?;
                if !data.is_empty() {
                    form.images.push(UploadFile {
                        filename,
                        data: data.to_vec(),
                    });
                }
            }
            "sound_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::ValidationError(format!("Invalid multipart payload: {}", e))
                })?;
                if !data.is_empty() {
                    form.sound = Some(UploadFile {
                        filename,
                        data: data.to_vec(),
                    });
                }
            }
            other => {
                let value = field.text().await.map_err(|e| {
                    ApiError::ValidationError(format!("Invalid multipart payload: {}", e))
                })?;
                match other {
                    "name" => form.name = Some(value),
                    "description" => form.description = Some(value),
                    "kind" => {
                        form.kind = Some(value.parse().map_err(|_| {
                            ApiError::ValidationError(format!("Invalid product type: {}", value))
                        })?);
                    }
                    "price" => {
                        form.price = Some(value.parse().map_err(|_| {
                            ApiError::ValidationError(format!("Invalid price: {}", value))
                        })?);
                    }
                    "featured" => {
                        form.featured = Some(parse_bool(&value).ok_or_else(|| {
                            ApiError::ValidationError(format!("Invalid featured flag: {}", value))
                        })?);
                    }
                    "stock" => {
                        form.stock = Some(value.parse().map_err(|_| {
                            ApiError::ValidationError(format!("Invalid stock: {}", value))
                        })?);
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn featured_flag_accepts_the_usual_spellings() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
