use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over bearer-token persistence.
/// The token is opaque here -- decoding and liveness live in `SessionState`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>, TokenStoreError>;
    async fn set(&self, token: &str) -> Result<(), TokenStoreError>;
    async fn clear(&self) -> Result<(), TokenStoreError>;
}

/// File-backed token store for the CLI. Holds a single token per path.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<String>, TokenStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let token = raw.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }

    async fn set(&self, token: &str) -> Result<(), TokenStoreError> {
        tokio::fs::write(&self.path, token).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        if self.path.exists() {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

/// In-memory token store. Used in tests so SessionState never needs a real
/// persistence backend.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: tokio::sync::RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self.token.read().await.clone())
    }

    async fn set(&self, token: &str) -> Result<(), TokenStoreError> {
        let mut lock = self.token.write().await;
        *lock = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        let mut lock = self.token.write().await;
        *lock = None;
        Ok(())
    }
}
