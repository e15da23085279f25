//! Upload storage for the residency report backend.
//!
//! This crate provides:
//! - The [`ObjectStore`] abstraction used by ingestion and file serving
//! - Streaming writes that stage into a temporary sibling and publish
//!   atomically without overwriting an existing object
//! - A local filesystem backend

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use residency_core::config::UploadsConfig;
use std::sync::Arc;

/// Create the upload store from configuration.
pub async fn from_config(config: &UploadsConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;
    let backend = FilesystemBackend::new(&config.root).await?;
    Ok(Arc::new(backend))
}
