//! Blob storage for uploaded documents.
//!
//! Documents are addressed by an opaque relative reference such as
//! `cvs/<uuid>.pdf`. [`LocalStorage`] maps references onto files under a
//! configured root directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid document reference: {0}")]
    InvalidReference(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("storage I/O error for {reference}: {source}")]
    Io {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

/// Put/get access to stored documents.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn put(&self, document_ref: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, document_ref: &str) -> Result<Vec<u8>, StorageError>;
}

/// Filesystem-backed [`DocumentStorage`].
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference to a path under the root.
    ///
    /// Only plain relative components are accepted.
    pub fn resolve(&self, document_ref: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(document_ref);
        let plain = !document_ref.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidReference(document_ref.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl DocumentStorage for LocalStorage {
    async fn put(&self, document_ref: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(document_ref)?;
        let io_err = |source| StorageError::Io {
            reference: document_ref.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io_err)
    }

    async fn get(&self, document_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(document_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(document_ref.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                reference: document_ref.to_string(),
                source,
            }),
        }
    }
}
