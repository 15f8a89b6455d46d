use std::path::Path;

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};

use crate::{
    error::{AppError, AppResult},
    metrics::Metrics,
    middleware::auth::CurrentUser,
    state::AppState,
    types::{Envelope, UploadedImage},
    uploads::{self, SizeGuard},
};

/// `POST /api/upload/book-image`: multipart form with the image in field `file`.
pub async fn upload_book_image(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let limit = state.config.uploads.max_file_size;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let mimetype = uploads::validate_mime(field.content_type())?.to_string();
        let original_name = field.file_name().unwrap_or("upload").to_string();

        let mut guard = SizeGuard::new(limit);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            guard.push(chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }

        let filename = uploads::generate_filename(&original_name);
        uploads::store(Path::new(&state.config.uploads.dir), &filename, &bytes).await?;
        Metrics::inc(&state.metrics.uploads);
        tracing::info!(user_id = %user.0.sub, %filename, size = bytes.len(), "book image uploaded");

        let image_url = uploads::image_url(&filename);
        return Ok(Json(Envelope::ok(UploadedImage {
            filename,
            original_name,
            size: bytes.len(),
            mimetype,
            image_url,
        })));
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}
