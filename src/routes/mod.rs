//! HTTP surface of the service.
//!
//! - `auth`: login and the current-user profile
//! - `books`: listing, CSV export and CRUD
//! - `upload`: book cover uploads
//! - `health`: liveness, readiness, metrics and version
//!
//! [`router`] wires them together with the middleware stack.

pub mod auth;
pub mod books;
pub mod health;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    config::CorsConfig,
    middleware::{audit, auth as auth_mw, rate_limit, security_headers, validation},
    state::AppState,
};

/// Builds the complete application router.
///
/// Public: `POST /api/auth/login`, health endpoints and stored images under `/uploads`.
/// Everything else under `/api` needs a bearer token; book mutations are audited.
pub fn router(state: AppState) -> Router {
    let cfg = state.config.clone();

    let protected = Router::new()
        .route("/api/books", get(books::list_books).post(books::create_book))
        .route("/api/books/export", get(books::export_books))
        .route(
            "/api/books/{id}",
            get(books::get_book)
                .patch(books::update_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route_layer(from_fn_with_state(state.clone(), audit::audit_mutations))
        .route("/api/upload/book-image", post(upload::upload_book_image))
        .route("/api/auth/me", get(auth::me))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .nest_service("/uploads", ServeDir::new(&cfg.uploads.dir))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(validation::max_body_bytes(&cfg)))
        .layer(from_fn_with_state(state, rate_limit::endpoint_rate_limit_middleware))
        .layer(from_fn_with_state(cfg.clone(), validation::validate_request_middleware))
        .layer(from_fn_with_state(cfg.clone(), rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg.clone(), security_headers::security_headers_middleware))
        .layer(cors_layer(&cfg.cors))
}

/// Allowlisted origins with credentials; `Content-Disposition` is exposed for CSV downloads.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin: {}", e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION])
}
