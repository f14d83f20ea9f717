use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{
    AppState,
    auth::{Identity, TokenService},
    config::Config,
    entities::user,
    routes,
    storage::LocalFileStorage,
};

pub const JWT_KEY: &str = "test-signing-key";

/// Fresh in-memory database with every migration applied.
pub async fn db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
    _uploads: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let uploads = TempDir::new().unwrap();
        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            database_url: "sqlite::memory:".into(),
            jwt_key: JWT_KEY.into(),
            upload_dir: uploads.path().to_path_buf(),
            public_base_url: "http://localhost/uploads".into(),
        };
        let storage = LocalFileStorage::new(uploads.path(), config.public_base_url.clone());
        let state = Arc::new(AppState {
            config: Arc::new(config),
            db: db().await,
            tokens: TokenService::new(JWT_KEY),
            storage: Arc::new(storage),
        });

        Self { router: routes::router(state.clone()), state, _uploads: uploads }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        Response { status, headers, body }
    }

    /// Inserts a user row directly and returns it with a token carrying `roles`.
    pub async fn user(&self, email: &str, roles: &[&str]) -> (user::Model, String) {
        let model = user::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(email.to_string()),
            password_hash: Set("unused".to_string()),
        }
        .insert(self.db())
        .await
        .unwrap();

        let token = self
            .state
            .tokens
            .issue(Identity {
                user_id: model.id.clone(),
                email: model.email.clone(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
                is_admin: false,
            })
            .unwrap()
            .token;
        (model, token)
    }

    pub async fn admin_token(&self) -> String {
        self.user("admin@example.com", &["admin"]).await.1
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, Body::empty(), None)
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    request("DELETE", uri, token, Body::empty(), None)
}

pub fn json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    request(method, uri, token, Body::from(body.to_string()), Some("application/json".to_string()))
}

pub fn multipart(method: &str, uri: &str, token: Option<&str>, body: MultipartBody) -> Request<Body> {
    let (content_type, bytes) = body.finish();
    request(method, uri, token, Body::from(bytes), Some(content_type))
}

fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Body,
    content_type: Option<String>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(body).unwrap()
}

/// Hand-built `multipart/form-data` body.
pub struct MultipartBody {
    boundary: &'static str,
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self { boundary: "cinecat-test-boundary", bytes: Vec::new() }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, content: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(content);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.bytes.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (format!("multipart/form-data; boundary={}", self.boundary), self.bytes)
    }
}
