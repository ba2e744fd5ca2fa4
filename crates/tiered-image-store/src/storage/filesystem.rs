//! Local filesystem tier with two-character directory sharding

use super::{validate_id, ImageStorage, StorageResult, RECORD_EXTENSION};
use crate::error::StorageError;
use crate::types::{ImageRecord, CANONICAL_FORMAT};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info};

/// Stores each record as `<base>/<s1>/<s2>/.../<last>.webp`, where the id is
/// split into two-character segments (`"123456"` -> `12/34/56.webp`).
pub struct FileSystemStorage {
    base_dir: PathBuf,
}

impl FileSystemStorage {
    /// Open (and create if needed) a storage root
    pub async fn new(base_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        info!(base_dir = ?base_dir, "Filesystem storage initialized");
        Ok(Self { base_dir })
    }

    /// Sharded location of a record
    pub fn record_path(&self, id: &str) -> StorageResult<PathBuf> {
        validate_id(id)?;

        let chars: Vec<char> = id.chars().collect();
        if chars.len() < 2 {
            return Ok(self
                .base_dir
                .join(format!("{}.{}", id, RECORD_EXTENSION)));
        }

        let mut parts: Vec<String> = chars.chunks(2).map(|c| c.iter().collect()).collect();
        let file_name = match parts.pop() {
            Some(last) => format!("{}.{}", last, RECORD_EXTENSION),
            None => return Err(StorageError::InvalidId(id.to_string())),
        };

        let mut path = self.base_dir.clone();
        path.extend(parts);
        path.push(file_name);
        Ok(path)
    }

    fn map_not_found(id: &str, err: std::io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound(id.to_string())
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl ImageStorage for FileSystemStorage {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        let path = self.record_path(&record.id)?;
        let parent = path.parent().unwrap_or(&self.base_dir).to_path_buf();
        fs::create_dir_all(&parent).await?;

        let data = record.data.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&parent, &target, &data))
            .await
            .map_err(std::io::Error::other)??;

        debug!(id = %record.id, size = record.data.len(), path = ?path, "Saved record to disk");
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<ImageRecord> {
        let path = self.record_path(id)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| Self::map_not_found(id, e))?;
        Ok(ImageRecord::new(id, data, CANONICAL_FORMAT))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.record_path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_not_found(id, e))?;
        debug!(id = %id, path = ?path, "Deleted record from disk");
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut pending = vec![self.base_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.base_dir) else {
                    continue;
                };
                let id: String = relative
                    .with_extension("")
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// Write through a uniquely named temp file in `dir`, then rename over `path`.
/// Concurrent writers of one record each get their own temp file.
fn write_atomically(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
