//! The flat download directory as seen by clients: listing, serving and
//! deleting finished files by name.

use std::{
    io,
    path::PathBuf,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info, warn};

use crate::security::{UnsafeFileName, ensure_safe_file_name};

#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    InvalidName(#[from] UnsafeFileName),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub name: String,
    pub size: u64,
    pub last_modified: i64,
    pub mime_type: String,
    pub download_url: String,
    pub delete_url: String,
}

impl GalleryEntry {
    fn new(name: String, size: u64, last_modified: i64) -> Self {
        let encoded = urlencoding::encode(&name).into_owned();
        let mime_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            download_url: format!("/api/download?filename={encoded}"),
            delete_url: format!("/api/download/{encoded}"),
            name,
            size,
            last_modified,
            mime_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadFiles {
    root: PathBuf,
}

impl DownloadFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Regular files directly under the root, newest first. A missing root
    /// is created and yields an empty listing.
    pub async fn list(&self) -> Result<Vec<GalleryEntry>, FileError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Removed between read_dir and stat.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            if !meta.is_file() {
                continue;
            }
            let last_modified = meta
                .modified()
                .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
                .unwrap_or(0);
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(GalleryEntry::new(name, meta.len(), last_modified));
        }

        files.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(files)
    }

    /// Maps a client-supplied name onto a path inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, FileError> {
        ensure_safe_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// Opens a file for streaming and returns it with its length.
    pub async fn open(&self, name: &str) -> Result<(File, u64), FileError> {
        let path = self.resolve(name)?;
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(FileError::NotFound(name.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let file = File::open(&path).await?;
        Ok((file, meta.len()))
    }

    pub async fn delete(&self, name: &str) -> Result<(), FileError> {
        let path = self.resolve(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(FileError::NotFound(name.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        tokio::fs::remove_file(&path).await?;
        info!("deleted {}", path.display());
        Ok(())
    }

    /// Best-effort removal after `delay`. Failures are only logged.
    pub fn schedule_delete(&self, name: &str, delay: Duration) {
        let path = match self.resolve(name) {
            Ok(path) => path,
            Err(err) => {
                warn!("not scheduling deletion: {err}");
                return;
            }
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("deleted {} after download", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!("{} already gone", path.display())
                }
                Err(err) => warn!("failed to delete {}: {err}", path.display()),
            }
        });
    }
}
