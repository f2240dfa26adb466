use std::path::PathBuf;

use actix_web::web;
use chrono::Utc;
use sha2::{Digest, Sha256};

const UPLOADS_DIR: &str = "uploads";
/// Largest accepted upload, in bytes.
pub const MAX_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Uploaded image is empty")]
    Empty,
    #[error("File too large")]
    FileTooLarge,
    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    /// Path relative to the static root, always with forward slashes.
    pub reference: String,
    pub path: PathBuf,
}

impl StoredUpload {
    pub fn url(&self) -> String {
        format!("/static/{}", self.reference)
    }
}

/// Writes uploads below `<static_root>/uploads/`. Serving the files is left
/// to the static file handler.
#[derive(Clone, Debug)]
pub struct UploadStore {
    static_root: PathBuf,
}

impl UploadStore {
    pub fn new(static_root: impl Into<PathBuf>) -> Self {
        Self {
            static_root: static_root.into(),
        }
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn extract_file_extension(mime_type: &str) -> Option<&'static str> {
        match mime_type {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            "image/bmp" => Some("bmp"),
            "image/tiff" => Some("tiff"),
            _ => None,
        }
    }

    pub fn validate_image_size(image_data: &[u8]) -> Result<(), StorageError> {
        if image_data.is_empty() {
            return Err(StorageError::Empty);
        }
        if image_data.len() > MAX_SIZE {
            return Err(StorageError::FileTooLarge);
        }
        Ok(())
    }

    /// Reduces a client supplied file name to `[A-Za-z0-9._-]`, without
    /// leading dots or path components.
    pub fn sanitize_file_name(name: &str) -> String {
        let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();
        let cleaned = cleaned.trim_start_matches('.').trim_matches('_');
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned.to_string()
        }
    }

    pub fn stored_file_name(image_data: &[u8], original_name: &str, mime_type: Option<&str>) -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let hash = Self::calculate_image_hash(image_data);
        let mut safe_name = Self::sanitize_file_name(original_name);
        if !safe_name.contains('.') {
            if let Some(ext) = mime_type.and_then(Self::extract_file_extension) {
                safe_name = format!("{}.{}", safe_name, ext);
            }
        }
        format!("{}_{}_{}", timestamp, &hash[..8], safe_name)
    }

    pub async fn save(
        &self,
        image_data: web::Bytes,
        original_name: &str,
        mime_type: Option<&str>,
    ) -> Result<StoredUpload, StorageError> {
        Self::validate_image_size(&image_data)?;

        let file_name = Self::stored_file_name(&image_data, original_name, mime_type);
        let dir = self.static_root.join(UPLOADS_DIR);
        let path = dir.join(&file_name);
        let target = path.clone();

        web::block(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&target, &image_data)
        })
        .await
        .map_err(|e| StorageError::Blocking(e.to_string()))??;

        log::info!("Stored upload at {}", path.display());
        Ok(StoredUpload {
            reference: format!("{}/{}", UPLOADS_DIR, file_name),
            path,
        })
    }
}
