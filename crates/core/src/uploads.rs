//! Retinal image upload rules.

use crate::error::CoreError;

/// Extensions accepted for fundus images.
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff"];

/// Default request body cap for upload endpoints (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Lower-cased extension of `filename`, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Validate an uploaded file name and return its normalized extension.
pub fn validate_image_filename(filename: &str) -> Result<String, CoreError> {
    match extension_of(filename) {
        Some(ext) if ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        Some(ext) => Err(CoreError::Validation(format!(
            "Unsupported image format '.{ext}'. Supported: {}",
            ALLOWED_IMAGE_EXTENSIONS.join(", ")
        ))),
        None => Err(CoreError::Validation(format!(
            "File '{filename}' has no extension"
        ))),
    }
}

/// Content-addressed name under which an upload is stored.
pub fn stored_file_name(sha256_hex: &str, ext: &str) -> String {
    format!("{sha256_hex}.{ext}")
}
