//! File storage for extracted attachments

use async_trait::async_trait;
use mailward_common::config::StorageConfig;
use mailward_common::{Error, Result};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

/// File storage trait
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store a file and return its path
    async fn store(&self, path: &str, data: &[u8]) -> Result<String>;

    /// Read a file
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete a file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if a file exists
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Storage path for an attachment of an incoming message
pub fn attachment_path(message_id: &Uuid, index: usize, filename: &str) -> String {
    // Filenames come from untrusted headers; keep only a safe subset
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.replace("..", "__");
    format!("{}/{}_{}", message_id, index, safe)
}

/// Local filesystem storage
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage instance from config
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Self::from_path(&config.path)
    }

    /// Create a new local storage instance from a path
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::Storage(format!("Failed to create storage directory: {}", e)))?;

        info!(path = %path.display(), "Initialized local file storage");

        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    /// Get full path for a relative path, with path traversal protection
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        if path.contains("..") {
            return Err(Error::Storage(
                "Path traversal detected: '..' is not allowed".to_string(),
            ));
        }

        if path.starts_with('/') || path.starts_with('\\') {
            return Err(Error::Storage("Absolute paths are not allowed".to_string()));
        }

        Ok(self.base_path.join(path))
    }

    async fn ensure_parent_exists(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn store(&self, path: &str, data: &[u8]) -> Result<String> {
        let full_path = self.full_path(path)?;
        self.ensure_parent_exists(&full_path).await?;

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create file: {}", e)))?;

        file.write_all(data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;

        debug!(path = %path, size = data.len(), "Stored file");

        Ok(path.to_string())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;

        let mut file = fs::File::open(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to open file: {}", e)))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read file: {}", e)))?;

        Ok(data)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;

        fs::remove_file(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete file: {}", e)))?;

        debug!(path = %path, "Deleted file");

        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(full_path.exists())
    }
}
