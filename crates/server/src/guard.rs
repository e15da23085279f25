//! Ingestion transaction guard.
//!
//! Owns the file staged by a request until persistence succeeds. Every
//! other way out of the request (an error return, a timeout, the request
//! future being dropped) deletes the file.

use crate::error::ApiResult;
use crate::metrics;
use residency_core::StagedArtifact;
use residency_storage::ObjectStore;
use std::sync::Arc;

/// Delete a stored upload, logging instead of failing.
///
/// A missing file counts as deleted.
pub async fn discard_stored(store: &dyn ObjectStore, key: &str, reason: &'static str) {
    match store.delete(key).await {
        Ok(()) => {
            tracing::info!(key = %key, reason, "Deleted upload file");
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(key = %key, reason, "Upload file already gone");
        }
        Err(e) => {
            metrics::CLEANUP_FAILURES.inc();
            tracing::warn!(key = %key, reason, error = %e, "Failed to delete upload file");
        }
    }
}

/// Cleanup scope for the file staged during one request.
pub struct IngestionGuard {
    store: Arc<dyn ObjectStore>,
    artifact: Option<StagedArtifact>,
}

impl IngestionGuard {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            artifact: None,
        }
    }

    /// Take ownership of a freshly published file.
    pub fn stage(&mut self, artifact: StagedArtifact) {
        debug_assert!(self.artifact.is_none(), "one artifact per request");
        self.artifact = Some(artifact);
    }

    pub fn artifact(&self) -> Option<&StagedArtifact> {
        self.artifact.as_ref()
    }

    /// Disarm: the file now belongs to the persistence layer.
    pub fn commit(mut self) -> Option<StagedArtifact> {
        self.artifact.take()
    }

    /// Delete the staged file, if any.
    pub async fn rollback(mut self) {
        if let Some(artifact) = self.artifact.take() {
            metrics::ARTIFACTS_CLEANED_UP.inc();
            discard_stored(self.store.as_ref(), &artifact.key, "request failed").await;
        }
    }

    /// Commit on success, roll back on failure. The original error is
    /// always the one returned.
    pub async fn settle<T>(self, result: ApiResult<T>) -> ApiResult<T> {
        match result {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(e) => {
                metrics::record_ingest_error(e.code());
                self.rollback().await;
                Err(e)
            }
        }
    }
}

impl Drop for IngestionGuard {
    fn drop(&mut self) {
        let Some(artifact) = self.artifact.take() else {
            return;
        };
        metrics::ARTIFACTS_CLEANED_UP.inc();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    discard_stored(store.as_ref(), &artifact.key, "request cancelled").await;
                });
            }
            Err(_) => {
                metrics::CLEANUP_FAILURES.inc();
                tracing::warn!(key = %artifact.key, "No runtime to delete orphaned upload file");
            }
        }
    }
}
