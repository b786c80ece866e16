use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use modelcar_api::{
    app_router,
    config::AppConfig,
    db,
    entities::ProductKind,
    events::{self, EventSender},
    services::catalog::CreateProductInput,
    services::UploadFile,
    AppState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_JWT_SECRET: &str =
    "an_extremely_long_and_random_test_secret_value_0123456789_zyxwvutsrq";

/// Test harness: the full application router backed by a throwaway SQLite
/// database and a temporary asset directory.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir for tests");
        let db_path = dir.path().join("modelcar_test.db");
        let public_dir = dir.path().join("public");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.public_dir = public_dir.display().to_string();
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = Arc::new(AppState::new(Arc::new(pool), cfg, event_sender));
        state
            .storage
            .ensure_directories()
            .await
            .expect("create asset directories");

        let router = app_router(state.clone());

        Self {
            router,
            state,
            _dir: dir,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a multipart request with text fields and files.
    pub async fn request_multipart(
        &self,
        method: Method,
        uri: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
        token: Option<&str>,
    ) -> axum::response::Response {
        let (content_type, body) = multipart_body(fields, files);

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let request = builder.body(Body::from(body)).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Register a fresh user over HTTP and return its bearer token and id.
    pub async fn register_user(&self, name: &str) -> (String, Uuid) {
        let suffix = Uuid::new_v4().simple().to_string();
        let payload = json!({
            "name": name,
            "email": format!("{}@example.com", &suffix[..12]),
            "phone": "11999999999",
            "cpf": &suffix[..11],
            "password": "segredo123",
            "confirm_password": "segredo123",
        });

        let response = self
            .request(Method::POST, "/api/users/register", Some(payload), None)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "register failed");

        let body = response_json(response).await;
        let token = body["token"].as_str().expect("token in response").to_string();
        let user_id = body["user_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("user id in response");
        (token, user_id)
    }

    /// Create an admin account directly through the service layer and hand
    /// back a token for it.
    pub async fn admin_token(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        let admin = self
            .state
            .services
            .users
            .register(
                modelcar_api::services::users::RegisterInput {
                    name: "Admin".to_string(),
                    email: format!("admin-{}@example.com", &suffix[..8]),
                    phone: "11888888888".to_string(),
                    cpf: format!("9{}", &suffix[..10]),
                    password: "segredo123".to_string(),
                    confirm_password: "segredo123".to_string(),
                },
                true,
            )
            .await
            .expect("seed admin for tests");

        self.state.auth.issue_token(&admin).expect("issue admin token")
    }

    /// Seed a product directly through the catalog service.
    pub async fn seed_product(
        &self,
        name: &str,
        kind: ProductKind,
        price: Decimal,
        stock: i32,
    ) -> modelcar_api::entities::ProductModel {
        self.state
            .services
            .catalog
            .create_product(
                CreateProductInput {
                    name: name.to_string(),
                    description: format!("{} seeded for integration tests", name),
                    kind,
                    price,
                    featured: false,
                    stock,
                },
                vec![UploadFile {
                    filename: "model.png".to_string(),
                    data: b"fakepngdata".to_vec(),
                }],
                None,
            )
            .await
            .expect("seed product for tests")
    }

    /// Saves address and payment method for a user so checkout can run.
    pub async fn complete_checkout_profile(&self, token: &str) {
        let address = json!({
            "street": "Via Abetone Inferiore",
            "number": "4",
            "neighborhood": "Fiorano",
            "city": "Maranello",
            "state": "MO",
            "zip_code": "41053",
        });
        let response = self
            .request(Method::PUT, "/api/users/address", Some(address), Some(token))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "saving address failed");

        let payment = json!({
            "kind": "credit",
            "card_number": "4111111111111111",
            "card_holder_name": "ENZO FERRARI",
            "expiration_date": "12/30",
            "cvv": "123",
        });
        let response = self
            .request(
                Method::PUT,
                "/api/users/payment-method",
                Some(payment),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "saving payment failed");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a money field as f64 regardless of whether the backend serialized
/// it as a JSON string or a number.
pub fn money(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .expect("numeric money field")
}

/// Builds a multipart/form-data body by hand; returns (content type, body).
pub fn multipart_body(
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
) -> (String, Vec<u8>) {
    let boundary = format!("----modelcar-test-{}", Uuid::new_v4().simple());
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for (name, filename, data) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (
        format!("multipart/form-data; boundary={}", boundary),
        body,
    )
}
