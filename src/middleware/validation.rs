use axum::{
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::{config::AppConfig, error::AppError};

/// Room for multipart framing and JSON bodies on top of the upload limit.
const BODY_OVERHEAD: usize = 64 * 1024;

/// Largest request body accepted, derived from the upload limit.
pub fn max_body_bytes(cfg: &AppConfig) -> usize {
    cfg.uploads.max_file_size.saturating_add(BODY_OVERHEAD)
}

/// Rejects path traversal in the request URI and bodies whose declared
/// `Content-Length` exceeds [`max_body_bytes`].
pub async fn validate_request_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if contains_path_traversal(path) {
        tracing::warn!(path = %sanitize_for_logging(path), "path traversal rejected");
        return AppError::BadRequest("Path traversal detected in request".to_string()).into_response();
    }

    if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let limit = max_body_bytes(&cfg);
        if let Some(length) = declared.filter(|&l| l > limit) {
            tracing::debug!(length, limit, "declared body too large");
            return AppError::PayloadTooLarge(format!("Request body exceeds maximum size of {} bytes", limit))
                .into_response();
        }
    }

    next.run(req).await
}

fn contains_path_traversal(path: &str) -> bool {
    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("\\.\\") {
        return true;
    }

    let lower = path.to_lowercase();
    let encoded_patterns = [
        "%2e%2e",
        "%252e%252e",
        "%2e/",
        "%252e%2f",
        "/%2e",
        "%2f%2e",
        "%2e%5c",
        "%5c%2e",
        "%00",
    ];
    if encoded_patterns.iter().any(|p| lower.contains(p)) {
        return true;
    }

    path.contains('\0')
}

/// Strips control characters and caps length before a value goes into a log line.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect()
}
