//! Media file storage.
//!
//! Uploaded profile files are written through the [`MediaStorage`] trait so
//! handlers stay independent of the backing disk. The only shipped backend is
//! [`LocalMediaStorage`], which maps relative media paths onto a configured
//! root directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::errors::Error;

/// Backend for storing uploaded media files.
///
/// Paths are relative, forward-slash separated, and produced by
/// [`media_path`]; backends must reject anything that escapes their root.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Write `contents` at `path`, creating parent directories as needed.
    /// Overwrites any existing file at the same path.
    async fn put(&self, path: &str, contents: Bytes) -> Result<(), Error>;

    /// Delete the file at `path`. Deleting a missing file is not an error.
    async fn delete(&self, path: &str) -> Result<(), Error>;
}

/// Relative storage path for a user's uploaded file.
///
/// Layout: `assets/profile/files/{user_id}/{name}.{ext}` with the extension
/// lowercased. The name and extension must already be validated.
pub fn media_path(user_id: &uuid::Uuid, name: &str, extension: &str) -> String {
    format!("assets/profile/files/{user_id}/{name}.{}", extension.to_lowercase())
}

/// Filesystem-backed storage under a root directory.
pub struct LocalMediaStorage {
    root: PathBuf,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative media path against the root, rejecting traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(path);
        let traverses = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if traverses || path.is_empty() {
            return Err(Error::BadRequest {
                message: format!("Invalid media path: {path}"),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn put(&self, path: &str, contents: Bytes) -> Result<(), Error> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Internal {
                operation: format!("create media directory {}: {e}", parent.display()),
            })?;
        }

        let mut file = tokio::fs::File::create(&target).await.map_err(|e| Error::Internal {
            operation: format!("create media file {}: {e}", target.display()),
        })?;
        file.write_all(&contents).await.map_err(|e| Error::Internal {
            operation: format!("write media file {}: {e}", target.display()),
        })?;
        file.flush().await.map_err(|e| Error::Internal {
            operation: format!("flush media file {}: {e}", target.display()),
        })?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Internal {
                operation: format!("delete media file {}: {e}", target.display()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_media_path_layout() {
        let id: Uuid = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(
            media_path(&id, "avatar", "PNG"),
            "assets/profile/files/550e8400-e29b-41d4-a716-446655440000/avatar.png"
        );
    }

    #[tokio::test]
    async fn test_put_and_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalMediaStorage::new(dir.path());

        let path = "assets/profile/files/abc/avatar.png";
        storage.put(path, Bytes::from_static(b"png-bytes")).await.unwrap();

        let on_disk = dir.path().join(path);
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"png-bytes");

        storage.delete(path).await.unwrap();
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalMediaStorage::new(dir.path());

        let path = "assets/profile/files/abc/doc.pdf";
        storage.put(path, Bytes::from_static(b"one")).await.unwrap();
        storage.put(path, Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(tokio::fs::read(dir.path().join(path)).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalMediaStorage::new(dir.path());
        storage.delete("assets/profile/files/abc/missing.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalMediaStorage::new(dir.path());

        let result = storage.put("../escape.png", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(Error::BadRequest { .. })));

        let result = storage.delete("/etc/passwd").await;
        assert!(matches!(result, Err(Error::BadRequest { .. })));
    }
}
