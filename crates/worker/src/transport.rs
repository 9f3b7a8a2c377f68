//! Where save files actually move.
//!
//! [`Transport`] is the seam between the poll loop and the storage backend.
//! [`LocalTransport`] keeps stored copies under a directory on this machine.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::progress::ProgressHandle;

/// Directory under the storage root holding `backup_all` snapshots. Never
/// itself backed up or cleared.
pub const BACKUP_DIR: &str = ".backups";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported operation kind: {0}")]
    Unsupported(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Operation payload fields understood by the transports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavePayload {
    /// Save directory (or single file) on this machine.
    pub save_path: Option<PathBuf>,
    /// Name of the stored copy.
    pub storage_key: Option<String>,
}

impl SavePayload {
    pub fn from_value(value: &serde_json::Value) -> TransportResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))
    }

    fn save_path(&self) -> TransportResult<&Path> {
        self.save_path
            .as_deref()
            .ok_or_else(|| TransportError::InvalidPayload("save_path is required".into()))
    }

    fn storage_key(&self) -> TransportResult<&str> {
        let key = self
            .storage_key
            .as_deref()
            .ok_or_else(|| TransportError::InvalidPayload("storage_key is required".into()))?;
        validate_storage_key(key)?;
        Ok(key)
    }
}

/// A storage key must name exactly one entry directly under the root.
fn validate_storage_key(key: &str) -> TransportResult<()> {
    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name != BACKUP_DIR => Ok(()),
        _ => Err(TransportError::InvalidPayload(format!(
            "storage_key {key:?} must be a single path segment"
        ))),
    }
}

/// Storage backend executing save-file operations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy the local save into storage.
    async fn save(&self, payload: &SavePayload, progress: &ProgressHandle) -> TransportResult<()>;

    /// Copy the stored save back to the local save path.
    async fn load(&self, payload: &SavePayload, progress: &ProgressHandle) -> TransportResult<()>;

    /// Remove one stored save.
    async fn delete(&self, payload: &SavePayload, progress: &ProgressHandle)
        -> TransportResult<()>;

    /// Snapshot every stored save.
    async fn backup_all(&self, progress: &ProgressHandle) -> TransportResult<()>;

    /// Remove every stored save.
    async fn delete_all(&self, progress: &ProgressHandle) -> TransportResult<()>;
}

/// Stores saves as directories under `root`.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stored(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Entries directly under the root, excluding the backup directory.
    async fn stored_entries(&self) -> TransportResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_name() != BACKUP_DIR {
                entries.push(entry.path());
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn save(&self, payload: &SavePayload, progress: &ProgressHandle) -> TransportResult<()> {
        let source = payload.save_path()?;
        let key = payload.storage_key()?;
        replace_with_copy(source, &self.stored(key), progress).await?;
        tracing::info!(storage_key = key, source = %source.display(), "Save stored");
        Ok(())
    }

    async fn load(&self, payload: &SavePayload, progress: &ProgressHandle) -> TransportResult<()> {
        let target = payload.save_path()?;
        let key = payload.storage_key()?;
        replace_with_copy(&self.stored(key), target, progress).await?;
        tracing::info!(storage_key = key, target = %target.display(), "Save restored");
        Ok(())
    }

    async fn delete(
        &self,
        payload: &SavePayload,
        progress: &ProgressHandle,
    ) -> TransportResult<()> {
        let key = payload.storage_key()?;
        let path = self.stored(key);
        if !tokio::fs::try_exists(&path).await? {
            return Err(TransportError::NotFound(path));
        }
        remove_path(&path).await?;
        progress.report(1, 1, "deleted");
        tracing::info!(storage_key = key, "Stored save deleted");
        Ok(())
    }

    async fn backup_all(&self, progress: &ProgressHandle) -> TransportResult<()> {
        let entries = self.stored_entries().await?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let backup_root = self.root.join(BACKUP_DIR).join(stamp);
        tokio::fs::create_dir_all(&backup_root).await?;

        let total = entries.len() as i64;
        for (i, entry) in entries.iter().enumerate() {
            let Some(name) = entry.file_name() else {
                continue;
            };
            copy_tree(entry, &backup_root.join(name)).await?;
            progress.report(i as i64 + 1, total, name.to_string_lossy());
        }
        tracing::info!(entries = total, backup = %backup_root.display(), "Backup created");
        Ok(())
    }

    async fn delete_all(&self, progress: &ProgressHandle) -> TransportResult<()> {
        let entries = self.stored_entries().await?;
        let total = entries.len() as i64;
        for (i, entry) in entries.iter().enumerate() {
            remove_path(entry).await?;
            progress.report(i as i64 + 1, total, "");
        }
        tracing::warn!(entries = total, "All stored saves deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

/// Copy `source` to `target`, replacing `target` only once the copy is
/// complete. Reports one progress step per file.
async fn replace_with_copy(
    source: &Path,
    target: &Path,
    progress: &ProgressHandle,
) -> TransportResult<()> {
    if !tokio::fs::try_exists(source).await? {
        return Err(TransportError::NotFound(source.to_path_buf()));
    }

    let files = list_files(source).await?;
    let total = files.len() as i64;
    progress.report(0, total, "");

    let staging = staging_path(target);
    if tokio::fs::try_exists(&staging).await? {
        remove_path(&staging).await?;
    }

    let source_is_dir = tokio::fs::metadata(source).await?.is_dir();
    for (i, relative) in files.iter().enumerate() {
        let (from, to) = if source_is_dir {
            (source.join(relative), staging.join(relative))
        } else {
            (source.to_path_buf(), staging.clone())
        };
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&from, &to).await?;
        progress.report(i as i64 + 1, total, relative.to_string_lossy());
    }
    if source_is_dir && files.is_empty() {
        tokio::fs::create_dir_all(&staging).await?;
    }

    if tokio::fs::try_exists(target).await? {
        remove_path(target).await?;
    }
    tokio::fs::rename(&staging, target).await?;
    Ok(())
}

/// Copy a file or directory tree.
async fn copy_tree(source: &Path, target: &Path) -> TransportResult<()> {
    if tokio::fs::metadata(source).await?.is_file() {
        tokio::fs::copy(source, target).await?;
        return Ok(());
    }
    tokio::fs::create_dir_all(target).await?;
    for relative in list_files(source).await? {
        let to = target.join(&relative);
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source.join(&relative), &to).await?;
    }
    Ok(())
}

/// Regular files under `root`, relative to it, in sorted order. A file
/// root yields its own name.
async fn list_files(root: &Path) -> TransportResult<Vec<PathBuf>> {
    if tokio::fs::metadata(root).await?.is_file() {
        let name = root.file_name().map(PathBuf::from).unwrap_or_default();
        return Ok(vec![name]);
    }

    let mut files = Vec::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(relative) = stack.pop() {
        let mut dir = tokio::fs::read_dir(root.join(&relative)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = relative.join(entry.file_name());
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

async fn remove_path(path: &Path) -> TransportResult<()> {
    if tokio::fs::metadata(path).await?.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}
