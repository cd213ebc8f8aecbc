use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::utils::validation::is_safe_key;

/// The two shared directories files live in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Uploaded spreadsheets and generated chart images
    Uploads,
    /// Generated PDF reports
    Reports,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Uploads => "uploads",
            StorageArea::Reports => "reports",
        }
    }
}

pub struct UploadResult {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Streams `reader` into `key`, replacing any existing file of that name.
    async fn upload_stream<'a>(
        &self,
        area: StorageArea,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult>;
    async fn put(&self, area: StorageArea, key: &str, data: Vec<u8>) -> Result<()>;
    async fn get(&self, area: StorageArea, key: &str) -> Result<Vec<u8>>;
    async fn exists(&self, area: StorageArea, key: &str) -> Result<bool>;
    async fn open(
        &self,
        area: StorageArea,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>>;
    async fn list(&self, area: StorageArea) -> Result<Vec<String>>;
    /// Deletes every regular file in the area (non-recursive). Returns the number removed.
    async fn clear(&self, area: StorageArea) -> Result<usize>;
}

/// Storage backed by two local directories
pub struct LocalStorageService {
    uploads_dir: PathBuf,
    reports_dir: PathBuf,
}

impl LocalStorageService {
    pub fn new(uploads_dir: PathBuf, reports_dir: PathBuf) -> Self {
        Self {
            uploads_dir,
            reports_dir,
        }
    }

    pub fn dir(&self, area: StorageArea) -> &Path {
        match area {
            StorageArea::Uploads => &self.uploads_dir,
            StorageArea::Reports => &self.reports_dir,
        }
    }

    /// Creates both directories if they are missing
    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.reports_dir).await?;
        Ok(())
    }

    fn resolve(&self, area: StorageArea, key: &str) -> Result<PathBuf> {
        if !is_safe_key(key) {
            return Err(anyhow!("Invalid storage key '{}'", key));
        }
        Ok(self.dir(area).join(key))
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn upload_stream<'a>(
        &self,
        area: StorageArea,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        let target = self.resolve(area, key)?;
        let staging = self.dir(area).join(format!(".{}.part", Uuid::new_v4()));

        let copied = async {
            let mut file = tokio::fs::File::create(&staging).await?;
            let size = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;

        let size = match copied {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e.into());
            }
        };

        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            tracing::error!(
                "Failed to move staged upload into place: staging={:?}, target={:?}, error={:?}",
                staging,
                target,
                e
            );
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        Ok(UploadResult {
            key: key.to_string(),
            size,
        })
    }

    async fn put(&self, area: StorageArea, key: &str, data: Vec<u8>) -> Result<()> {
        let target = self.resolve(area, key)?;
        tokio::fs::write(target, data).await?;
        Ok(())
    }

    async fn get(&self, area: StorageArea, key: &str) -> Result<Vec<u8>> {
        let target = self.resolve(area, key)?;
        Ok(tokio::fs::read(target).await?)
    }

    async fn exists(&self, area: StorageArea, key: &str) -> Result<bool> {
        let Ok(target) = self.resolve(area, key) else {
            return Ok(false);
        };
        match tokio::fs::metadata(&target).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn open(
        &self,
        area: StorageArea,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        let target = self.resolve(area, key)?;
        let file = tokio::fs::File::open(target).await?;
        Ok(Box::new(file))
    }

    async fn list(&self, area: StorageArea) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(self.dir(area)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn clear(&self, area: StorageArea) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(self.dir(area)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        tracing::info!("🧹 Cleared {} file(s) from {}", removed, area.as_str());
        Ok(removed)
    }
}
