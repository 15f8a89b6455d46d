//! Book cover uploads stored on local disk under `<uploads dir>/books`.

use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Sub-directory of the uploads root that holds book images.
pub const BOOKS_SUBDIR: &str = "books";

pub fn validate_mime(mime: Option<&str>) -> AppResult<&str> {
    match mime {
        Some(m) if ALLOWED_MIME_TYPES.contains(&m) => Ok(m),
        Some(m) => Err(AppError::BadRequest(format!(
            "Unsupported file type '{}'. Allowed: {}",
            m,
            ALLOWED_MIME_TYPES.join(", ")
        ))),
        None => Err(AppError::BadRequest("File content type is required".to_string())),
    }
}

/// Lowercased extension of the client-supplied name, with the dot, or empty when
/// the name has no usable extension.
pub fn extension_for(original_name: &str) -> String {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or(original_name);
    match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

/// `book-<unix millis>-<random>` plus the original extension.
pub fn generate_filename(original_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().as_u128() % 1_000_000_000;
    format!("book-{}-{}{}", millis, suffix, extension_for(original_name))
}

pub fn image_url(filename: &str) -> String {
    format!("/uploads/{}/{}", BOOKS_SUBDIR, filename)
}

/// Running byte count for a streamed upload.
#[derive(Debug)]
pub struct SizeGuard {
    limit: usize,
    seen: usize,
}

impl SizeGuard {
    pub fn new(limit: usize) -> Self {
        Self { limit, seen: 0 }
    }

    pub fn push(&mut self, len: usize) -> AppResult<()> {
        self.seen = self.seen.saturating_add(len);
        if self.seen > self.limit {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds maximum size of {} bytes",
                self.limit
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn total(&self) -> usize {
        self.seen
    }
}

/// Writes `bytes` to `<root>/books/<filename>`, creating the directory if needed.
pub async fn store(root: &Path, filename: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    let dir = root.join(BOOKS_SUBDIR);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    tracing::info!(path = %path.display(), size = bytes.len(), "upload stored");
    Ok(path)
}
