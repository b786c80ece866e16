use crate::handlers::common::{
    created_response, map_service_error, no_content_response, parse_id, success_response,
    validate_input,
};
use crate::{
    auth::{public_user, AdminUser, AuthRouterExt, CurrentUser, PublicUser},
    errors::ApiError,
    handlers::{cart, orders},
    services::users::{EditUserInput, RegisterInput},
    services::UploadFile,
    AppState,
};
use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    routing::{get, patch, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Routes under `/api/users`: account lifecycle, profile data, and the
/// nested cart and order workflows.
pub fn users_routes() -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/check", get(check_user))
        .route("/checkuser", get(check_user));

    let admin = Router::new()
        .route("/admin/register", post(register_admin))
        .route("/", get(list_users))
        .with_admin();

    // DELETE /:id is admin-only; it shares its path with owner-scoped
    // methods, so the role check lives in the extractor rather than a layer.
    let authed = Router::new()
        .route("/address", get(get_address).put(update_address))
        .route(
            "/payment-method",
            get(get_payment_method).put(update_payment_method),
        )
        .route("/edit", patch(edit_profile))
        .route("/:id/change-password", put(change_password))
        .route("/:id", get(get_user).put(edit_user).delete(delete_user))
        .merge(cart::cart_routes())
        .merge(orders::orders_routes())
        .with_auth();

    public.merge(admin).merge(authed)
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    name: String,
    #[validate(email)]
    email: String,
    phone: String,
    cpf: String,
    password: String,
    confirm_password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Token envelope shared by register and login.
#[derive(Debug, Serialize)]
struct AuthResponse {
    message: String,
    token: String,
    user_id: Uuid,
    admin: bool,
    user: PublicUser,
}

#[derive(Debug, Deserialize, Default)]
struct EditUserRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    cpf: Option<String>,
    password: Option<String>,
    confirm_password: Option<String>,
    admin: Option<bool>,
}

impl From<EditUserRequest> for EditUserInput {
    fn from(payload: EditUserRequest) -> Self {
        EditUserInput {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            cpf: payload.cpf,
            password: payload.password,
            confirm_password: payload.confirm_password,
            admin: payload.admin,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
struct AddressRequest {
    #[validate(length(min = 1))]
    street: String,
    #[validate(length(min = 1))]
    number: String,
    complement: Option<String>,
    #[validate(length(min = 1))]
    neighborhood: String,
    #[validate(length(min = 1))]
    city: String,
    #[validate(length(min = 1))]
    state: String,
    #[validate(length(min = 1))]
    zip_code: String,
}

#[derive(Debug, Deserialize, Validate)]
struct PaymentMethodRequest {
    kind: crate::entities::PaymentKind,
    #[validate(length(min = 1))]
    card_number: String,
    #[validate(length(min = 1))]
    card_holder_name: String,
    #[validate(length(min = 1))]
    expiration_date: String,
    #[validate(length(min = 1))]
    cvv: String,
}

/// Register a new account and hand back a token
async fn register(
    State(state): State<Arc<AppState>>,
    axum::Json(payload): axum::Json<RegisterRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let user = state
        .services
        .users
        .register(
            RegisterInput {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                cpf: payload.cpf,
                password: payload.password,
                confirm_password: payload.confirm_password,
            },
            false,
        )
        .await
        .map_err(map_service_error)?;

    let token = state.auth.issue_token(&user).map_err(map_service_error)?;
    Ok(created_response(AuthResponse {
        message: "User registered successfully".to_string(),
        token,
        user_id: user.id,
        admin: user.admin,
        user: public_user(&user),
    }))
}

/// Same as register, but requires an admin and creates an admin account
async fn register_admin(
    State(state): State<Arc<AppState>>,
    axum::Json(payload): axum::Json<RegisterRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let user = state
        .services
        .users
        .register(
            RegisterInput {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                cpf: payload.cpf,
                password: payload.password,
                confirm_password: payload.confirm_password,
            },
            true,
        )
        .await
        .map_err(map_service_error)?;

    let token = state.auth.issue_token(&user).map_err(map_service_error)?;
    Ok(created_response(AuthResponse {
        message: "Admin registered successfully".to_string(),
        token,
        user_id: user.id,
        admin: user.admin,
        user: public_user(&user),
    }))
}

/// Log in with email and password
async fn login(
    State(state): State<Arc<AppState>>,
    axum::Json(payload): axum::Json<LoginRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let user = state
        .services
        .users
        .login(&payload.email, &payload.password)
        .await
        .map_err(map_service_error)?;

    let token = state.auth.issue_token(&user).map_err(map_service_error)?;
    Ok(success_response(AuthResponse {
        message: "Authentication successful".to_string(),
        token,
        user_id: user.id,
        admin: user.admin,
        user: public_user(&user),
    }))
}

/// Resolve the current token to a user; always 200, null for anonymous or
/// invalid tokens
async fn check_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl axum::response::IntoResponse {
    let user = state.auth.resolve_headers(&headers).await;
    success_response(user.map(|u| public_user(&u)))
}

/// Public profile by id
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    CurrentUser(_requester): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let user = state
        .services
        .users
        .get_user(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(public_user(&user)))
}

/// All accounts, admin only
async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let users = state
        .services
        .users
        .list_users()
        .await
        .map_err(map_service_error)?;
    let users: Vec<PublicUser> = users.iter().map(public_user).collect();
    Ok(success_response(users))
}

/// Edit the current user's profile; multipart with an optional `image` part
async fn edit_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(requester): CurrentUser,
    multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (input, image) = read_profile_multipart(multipart).await?;

    let updated = state
        .services
        .users
        .edit_user(requester.id, input, image, &requester)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(public_user(&updated)))
}

/// Edit a user by id; the target must be the requester or the requester an
/// admin
async fn edit_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    CurrentUser(requester): CurrentUser,
    axum::Json(payload): axum::Json<EditUserRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let updated = state
        .services
        .users
        .edit_user(id, payload.into(), None, &requester)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(public_user(&updated)))
}

/// Change a password after verifying the current one
async fn change_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    CurrentUser(requester): CurrentUser,
    axum::Json(payload): axum::Json<ChangePasswordRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    state
        .services
        .users
        .change_password(
            id,
            &payload.current_password,
            &payload.new_password,
            &payload.confirm_password,
            &requester,
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({
        "message": "Password changed successfully"
    })))
}

/// The current user's shipping address, or null
async fn get_address(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let address = state
        .services
        .users
        .get_address(user.id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(address))
}

/// Replace the current user's shipping address
async fn update_address(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    axum::Json(payload): axum::Json<AddressRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let address = state
        .services
        .users
        .update_address(
            user.id,
            crate::entities::Address {
                street: payload.street,
                number: payload.number,
                complement: payload.complement,
                neighborhood: payload.neighborhood,
                city: payload.city,
                state: payload.state,
                zip_code: payload.zip_code,
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(address))
}

/// The current user's payment method without its cvv, or null
async fn get_payment_method(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let payment_method = state
        .services
        .users
        .get_payment_method(user.id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(payment_method))
}

/// Replace the current user's payment method; the response omits the cvv
async fn update_payment_method(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    axum::Json(payload): axum::Json<PaymentMethodRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let summary = state
        .services
        .users
        .update_payment_method(
            user.id,
            crate::entities::PaymentMethod {
                kind: payload.kind,
                card_number: payload.card_number,
                card_holder_name: payload.card_holder_name,
                expiration_date: payload.expiration_date,
                cvv: payload.cvv,
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(summary))
}

/// Delete an account with everything it owns, admin only
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AdminUser(_admin): AdminUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    state
        .services
        .users
        .delete_user(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Pulls the profile fields and the optional image out of the multipart body.
async fn read_profile_multipart(
    mut multipart: Multipart,
) -> Result<(EditUserInput, Option<UploadFile>), ApiError> {
    let mut input = EditUserInput::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::ValidationError(format!("Invalid multipart payload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::ValidationError(format!("Invalid multipart payload: {}", e))
                })?;
                if !data.is_empty() {
                    image = Some(UploadFile {
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
                    "name" => input.name = Some(value),
                    "email" => input.email = Some(value),
                    "phone" => input.phone = Some(value),
                    "cpf" => input.cpf = Some(value),
                    "password" => input.password = Some(value),
                    "confirm_password" => input.confirm_password = Some(value),
                    _ => {}
                }
            }
        }
    }

    Ok((input, image))
}
