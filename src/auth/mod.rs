//! JWT authentication: token issue/verify, the resolve-token-to-user step,
//! and the router middleware that gates owner-scoped and admin routes.
//!
//! Tokens are HS256-signed and purely time-limited; there is no revocation.
//! A token that fails to resolve (bad signature, expired, vanished user) is
//! treated as anonymous by callers that tolerate it and as a 401 by the
//! `require_auth` middleware.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{user, User, UserModel};
use crate::errors::ServiceError;

/// Claims carried by every issued token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    /// Display name, for client convenience
    pub name: String,
    /// Admin flag at issue time
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Stateless token service. Verification never touches the database except
/// for the final user lookup in [`AuthService::resolve_token`].
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    validity: Duration,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(jwt_secret: String, expiration_days: i64, db: Arc<DatabaseConnection>) -> Self {
        Self {
            jwt_secret,
            validity: Duration::days(expiration_days),
            db,
        }
    }

    /// Issues a signed token for the user, valid for the configured window.
    pub fn issue_token(&self, user: &UserModel) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            name: user.name.clone(),
            admin: user.admin,
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Token creation failed: {}", e)))
    }

    /// Decodes and verifies a token, returning its claims. `None` for any
    /// failure: bad signature, malformed token, expired.
    pub fn decode_claims(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .ok()
    }

    /// Resolves a bearer token to a live user row. `None` (never an error)
    /// on a missing/invalid/expired token or when the user no longer exists;
    /// callers treat `None` as anonymous.
    pub async fn resolve_token(&self, token: &str) -> Option<UserModel> {
        let claims = self.decode_claims(token)?;

        match User::find_by_id(claims.sub).one(&*self.db).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "User lookup during token resolution failed");
                None
            }
        }
    }

    /// Resolves the `Authorization` header of a request, if any.
    pub async fn resolve_headers(&self, headers: &HeaderMap) -> Option<UserModel> {
        let token = bearer_token(headers)?;
        self.resolve_token(token).await
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

/// Extracts the token from a `Bearer` authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Hashes a password with argon2 and a fresh per-user salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("Password hashing failed: {}", e)))
}

/// Verifies a password against a stored argon2 hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| ServiceError::InternalError(format!("Stored password hash invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// The authenticated user of the current request. Inserted into request
/// extensions by [`require_auth`]; when no auth middleware ran on the route,
/// the extractor resolves the bearer token itself.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserModel);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }

        let auth = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| ServiceError::InternalError("Auth service not available".to_string()))?;

        auth.resolve_headers(&parts.headers)
            .await
            .map(CurrentUser)
            .ok_or_else(|| ServiceError::AuthError("Access denied".to_string()))
    }
}

/// An authenticated admin. Non-admin identities are rejected with a 403,
/// anonymous requests with a 401.
#[derive(Clone, Debug)]
pub struct AdminUser(pub UserModel);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.admin {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// Middleware gating owner-scoped routes. Rejects with 401 when the bearer
/// token is missing, invalid, expired, or points at a deleted user; on
/// success the resolved [`CurrentUser`] is inserted into request extensions.
pub async fn require_auth(mut request: Request, next: Next) -> Response {
    let auth = match request.extensions().get::<Arc<AuthService>>() {
        Some(auth) => auth.clone(),
        None => {
            return ServiceError::InternalError("Auth service not available".to_string())
                .into_response();
        }
    };

    match auth.resolve_headers(request.headers()).await {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        None => ServiceError::AuthError("Access denied".to_string()).into_response(),
    }
}

/// Middleware gating admin routes; must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<CurrentUser>() {
        Some(CurrentUser(user)) if user.admin => next.run(request).await,
        Some(_) => ServiceError::Forbidden("Access denied".to_string()).into_response(),
        None => ServiceError::AuthError("Access denied".to_string()).into_response(),
    }
}

/// Extension methods for Router to apply the auth gates.
pub trait AuthRouterExt {
    /// Requires a valid bearer token that resolves to a live user.
    fn with_auth(self) -> Self;
    /// Requires an authenticated admin.
    fn with_admin(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(require_auth))
    }

    fn with_admin(self) -> Self {
        // Layers run outermost-first, so auth resolves before the role check.
        self.layer(axum::middleware::from_fn(require_admin))
            .with_auth()
    }
}

/// Builds a view of a user safe to serialize in responses (no password hash,
/// no cvv inside the payment method).
pub fn public_user(user: &UserModel) -> PublicUser {
    PublicUser {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        cpf: user.cpf.clone(),
        admin: user.admin,
        image: user.image.clone(),
        address: user.address(),
        payment_method: user.payment_method().map(|pm| pm.summary()),
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

/// User representation returned by the API. Strips the password hash and the
/// payment method's cvv.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub cpf: String,
    pub admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<user::Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<user::PaymentMethodSummary>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn service() -> AuthService {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        AuthService::new(
            "an_extremely_long_and_random_test_secret_value_0123456789_zyxwvutsrq".to_string(),
            7,
            Arc::new(db),
        )
    }

    fn sample_user() -> UserModel {
        UserModel {
            id: Uuid::new_v4(),
            name: "Enzo".to_string(),
            email: "enzo@example.com".to_string(),
            phone: "11999999999".to_string(),
            cpf: "12345678901".to_string(),
            password_hash: String::new(),
            admin: true,
            image: None,
            address: None,
            payment_method: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_decode_back_to_the_same_claims() {
        let auth = service();
        let user = sample_user();

        let token = auth.issue_token(&user).unwrap();
        let claims = auth.decode_claims(&token).expect("claims expected");

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.name, "Enzo");
        assert!(claims.admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn garbage_tokens_yield_no_claims() {
        let auth = service();
        assert!(auth.decode_claims("not-a-token").is_none());
        assert!(auth.decode_claims("").is_none());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let auth = service();
        let other = AuthService::new(
            "a_completely_different_secret_with_enough_length_9876543210_abcdefgh".to_string(),
            7,
            Arc::new(MockDatabase::new(DatabaseBackend::Sqlite).into_connection()),
        );

        let token = other.issue_token(&sample_user()).unwrap();
        assert!(auth.decode_claims(&token).is_none());
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("segredo123").unwrap();
        assert_ne!(hash, "segredo123");
        assert!(verify_password("segredo123", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn public_user_strips_secrets() {
        let mut user = sample_user();
        user.password_hash = "hash".to_string();
        user.payment_method = Some(serde_json::json!({
            "kind": "credit",
            "card_number": "4111111111111111",
            "card_holder_name": "ENZO F",
            "expiration_date": "12/30",
            "cvv": "123"
        }));

        let view = public_user(&user);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json["payment_method"].get("cvv").is_none());
        assert_eq!(json["payment_method"]["card_number"], "4111111111111111");
    }
}
