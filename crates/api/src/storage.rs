//! Content-addressed storage for uploaded fundus images.

use std::io::ErrorKind;
use std::path::Path;

use retina_core::uploads::stored_file_name;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Where an upload landed, and whether this call put it there.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path: String,
    pub created: bool,
}

/// Write `bytes` under `dir` as `{sha256}.{ext}`.
///
/// The content goes to a private `.part` file first and is then linked into
/// place, so readers never see a partial image and concurrent uploads of the
/// same bytes cannot clobber each other. An existing file is left alone.
pub async fn store_image(
    dir: &Path,
    sha256: &str,
    ext: &str,
    bytes: &[u8],
) -> AppResult<StoredImage> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create upload dir: {e}")))?;

    let name = stored_file_name(sha256, ext);
    let path = dir.join(&name);
    let stored = |created| StoredImage {
        path: path.to_string_lossy().to_string(),
        created,
    };
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(stored(false));
    }

    let part = dir.join(format!(".{name}.{}.part", Uuid::new_v4()));
    tokio::fs::write(&part, bytes)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;

    let linked = tokio::fs::hard_link(&part, &path).await;
    if let Err(e) = tokio::fs::remove_file(&part).await {
        tracing::warn!(path = %part.display(), error = %e, "Failed to remove partial upload");
    }
    match linked {
        Ok(()) => Ok(stored(true)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(stored(false)),
        Err(e) => Err(AppError::InternalError(format!("Failed to store upload: {e}"))),
    }
}

/// Delete a file written by this request. Files that already existed are
/// never touched.
pub async fn discard_image(image: &StoredImage) {
    if !image.created {
        return;
    }
    match tokio::fs::remove_file(&image.path).await {
        Ok(()) => tracing::debug!(path = %image.path, "Removed unreferenced upload"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %image.path, error = %e, "Failed to remove upload"),
    }
}
