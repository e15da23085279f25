//! HTTP server for the residency report backend.
//!
//! This crate provides:
//! - The admission gate middleware (public routes, bearer tokens, API key)
//! - Streaming multipart ingestion of report uploads
//! - The ingestion guard that deletes files of failed requests
//! - Report and upload-serving endpoints

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod persistence;
pub mod routes;
pub mod state;

pub use auth::{AdmissionGate, TraceId};
pub use error::ApiError;
pub use guard::IngestionGuard;
pub use routes::create_router;
pub use state::AppState;
