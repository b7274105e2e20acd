//! Stimulus image delivery
//!
//! Images are addressed by participant, item index and screen slot
//! (`image`, `left`, `right`), never by filename.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use psv_common::catalog::media_type;
use psv_common::{AssetSlot, Error, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path as FsPath, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::ApiError;
use crate::AppState;

/// Image bytes keyed by path, filled on first read
#[derive(Default)]
pub struct AssetCache {
    entries: RwLock<HashMap<PathBuf, Bytes>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &FsPath) -> Result<Bytes> {
        if let Some(bytes) = self.entries.read().await.get(path) {
            return Ok(bytes.clone());
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Image {} is missing",
                    path.display()
                )))
            }
            Err(e) => {
                return Err(Error::NotFound(format!(
                    "Image {} is unreadable: {}",
                    path.display(),
                    e
                )))
            }
        };

        debug!("Cached {} ({} bytes)", path.display(), bytes.len());
        self.entries
            .write()
            .await
            .insert(path.to_path_buf(), bytes.clone());
        Ok(bytes)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// MIME type from the file extension
///
/// Pair halves always share a format (the catalog drops mixed pairs), so
/// the header is the same for both sides.
pub fn content_type(path: &FsPath) -> &'static str {
    media_type(path).unwrap_or("application/octet-stream")
}

/// GET /api/participants/:id/items/:index/:slot
pub async fn get_item_asset(
    State(state): State<AppState>,
    Path((participant, index, slot)): Path<(String, usize, String)>,
) -> std::result::Result<Response, ApiError> {
    let slot: AssetSlot = slot.parse()?;
    let path = state
        .controller
        .asset_path(&participant, index, slot)
        .await?;
    let bytes = state.assets.get(&path).await?;

    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(FsPath::new("a.png")), "image/png");
        assert_eq!(content_type(FsPath::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type(FsPath::new("a.jpeg")), "image/jpeg");
        assert_eq!(
            content_type(FsPath::new("notes.txt")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_cache_serves_bytes_after_file_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let cache = AssetCache::new();
        assert_eq!(cache.get(&path).await.unwrap(), Bytes::from_static(b"png-bytes"));

        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.get(&path).await.unwrap(), Bytes::from_static(b"png-bytes"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new();
        let result = cache.get(&dir.path().join("gone.png")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
