//! Startup checks for the upload store.

use anyhow::{Context, Result};
use residency_storage::ObjectStore;

/// Verify the store is usable and remove staging files left behind by a
/// previous process that died mid-upload.
///
/// Returns the number of staging files removed.
pub async fn prepare_storage(storage: &dyn ObjectStore) -> Result<usize> {
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend connectivity verified");

    let removed = storage
        .sweep_staging()
        .await
        .context("failed to sweep abandoned uploads")?;
    if removed > 0 {
        tracing::warn!(removed, "Removed abandoned partial uploads");
    } else {
        tracing::debug!("No abandoned partial uploads found");
    }
    Ok(removed)
}
