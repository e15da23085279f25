//! Core domain types and shared logic for the residency report backend.
//!
//! This crate defines the pieces every other crate agrees on:
//! - Configuration (server, auth, uploads)
//! - Credential verification (bearer tokens and the optional API key)
//! - Public route classification
//! - The ingestion field bag and staged-artifact types
//! - Typed report field validation

pub mod config;
pub mod error;
pub mod fields;
pub mod report;
pub mod routes;
pub mod token;
pub mod upload;

pub use error::{Error, Result};
pub use fields::FieldBag;
pub use report::{NewReport, ReportRecord, ReportUpdate};
pub use routes::PublicRoutes;
pub use token::{ApiKeyPolicy, Claims, JwtVerifier, Principal, TokenError, VerifyToken};
pub use upload::{ArtifactName, StagedArtifact};

/// Default request body ceiling: 50 MiB
pub const DEFAULT_MAX_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// Default ceiling for a single scalar form field: 64 KiB
pub const DEFAULT_MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
