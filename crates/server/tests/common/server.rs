//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use residency_core::{JwtVerifier, Principal};
use residency_core::config::AppConfig;
use residency_server::persistence::{MemoryReportRepository, ReportRepository};
use residency_server::{AppState, create_router};
use residency_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, Arc::new(MemoryReportRepository::new())).await
    }

    /// Create a test server backed by the given repository.
    pub async fn with_repository(reports: Arc<dyn ReportRepository>) -> Self {
        Self::build(|_| {}, reports).await
    }

    async fn build<F>(modifier: F, reports: Arc<dyn ReportRepository>) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        config.uploads.root = temp_dir.path().join("uploads");
        modifier(&mut config);

        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&config.uploads.root)
                .await
                .expect("Failed to create storage backend"),
        );

        let state = AppState::new(config, storage, reports).expect("Invalid test configuration");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Uploads root on disk.
    pub fn uploads_root(&self) -> &Path {
        &self.state.config.uploads.root
    }

    /// Every regular file under the uploads root, staging files included.
    pub fn files_on_disk(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    out.push(path);
                }
            }
        }
        let mut out = Vec::new();
        walk(self.uploads_root(), &mut out);
        out.sort();
        out
    }

    /// Issue a bearer token for the given user.
    pub fn token(&self, subject: &str, role_id: i64) -> String {
        JwtVerifier::from_config(&self.state.config.auth)
            .issue(&Principal::new(subject, role_id))
            .expect("Failed to issue token")
    }

    /// Send a request and return the status with the JSON body (or Null).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a request and return the status with the raw body.
    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, bytes::Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }
}
