//! Router-level tests driven through `tower::ServiceExt::oneshot` against an
//! in-memory SQLite database.
//!
//! - **api_tests**: authentication, book CRUD, audit trail, uploads
//! - **listing_api_tests**: filtering, sorting, pagination and CSV export over HTTP
//! - **error_tests**: error-to-response mapping
//! - **config_tests**: configuration loading and validation
//! - **db_tests**: schema initialization
//! - **health_api_tests**: health, metrics, version and middleware headers

pub mod config_tests;
pub mod health_api_tests;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{auth::Role, config::AppConfig, routes, state::AppState};

pub const ADMIN_EMAIL: &str = "admin@bookstock.local";
pub const ADMIN_PASSWORD: &str = "admin1234";
pub const USER_EMAIL: &str = "reader@bookstock.local";
pub const USER_PASSWORD: &str = "reader1234";
pub const TEST_JWT_SECRET: &str = "bookstock-test-secret-0123456789";
/// Lowest bcrypt cost, so hashing does not dominate test time.
pub const TEST_BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub uploads: TempDir,
}

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::init_db(&pool).await.unwrap();
    pool
}

pub fn test_config(uploads: &TempDir) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.database.url = "sqlite::memory:".to_string();
    cfg.uploads.dir = uploads.path().display().to_string();
    cfg.auth.jwt_secret = TEST_JWT_SECRET.to_string();
    cfg.auth.bcrypt_cost = TEST_BCRYPT_COST;
    cfg.auth.admin_email = Some(ADMIN_EMAIL.to_string());
    cfg.auth.admin_password = Some(ADMIN_PASSWORD.to_string());
    cfg
}

pub async fn setup_test_app() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let config = test_config(&uploads);
    let pool = memory_pool().await;
    crate::auth::seed_admin(&pool, &config.auth).await.unwrap();
    crate::auth::create_user(&pool, USER_EMAIL, USER_PASSWORD, Role::User, TEST_BCRYPT_COST)
        .await
        .unwrap();

    let state = AppState::new(pool, config);
    let app = routes::router(state.clone());
    TestApp { app, state, uploads }
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub fn json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn with_json(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "bookstock-tests");
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, _, body) = send(
        app,
        with_json(Method::POST, "/api/auth/login", None, serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", String::from_utf8_lossy(&body));
    json(&body)["access_token"].as_str().unwrap().to_string()
}

pub async fn admin_token(app: &Router) -> String {
    login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

pub async fn create_book(app: &Router, token: &str, book: Value) -> Value {
    let (status, _, body) = send(app, with_json(Method::POST, "/api/books", Some(token), book)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", String::from_utf8_lossy(&body));
    json(&body)
}

pub fn book_json(title: &str, author: &str, publisher: &str, genre: &str, price: &str, available: bool) -> Value {
    serde_json::json!({
        "title": title,
        "author": author,
        "publisher": publisher,
        "genre": genre,
        "price": price,
        "available": available,
    })
}
