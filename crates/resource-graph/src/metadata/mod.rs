//! Loading the type metadata document.

mod loader;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::MetadataError;

pub use loader::MetadataLoader;

/// Supplies the raw metadata JSON document.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> Result<String, MetadataError>;
}

/// Reads the document from a file. Read failures are retryable.
#[derive(Debug, Clone)]
pub struct FileMetadataSource {
    path: PathBuf,
}

impl FileMetadataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetadataSource for FileMetadataSource {
    async fn fetch(&self) -> Result<String, MetadataError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MetadataError::Fetch {
                message: format!("{}: {e}", self.path.display()),
                retryable: true,
            })
    }
}

/// Serves a fixed document.
#[derive(Debug, Clone)]
pub struct StaticMetadataSource {
    document: String,
}

impl StaticMetadataSource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

#[async_trait]
impl MetadataSource for StaticMetadataSource {
    async fn fetch(&self) -> Result<String, MetadataError> {
        Ok(self.document.clone())
    }
}
