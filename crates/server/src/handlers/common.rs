//! Shared response shapes and helpers.

use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::http::StatusCode;
use residency_core::ReportRecord;
use serde::Serialize;

/// Success envelope: `{status: true, message, data}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: true,
            message: message.into(),
            data,
        })
    }

    pub fn created(message: impl Into<String>, data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Self::ok(message, data))
    }
}

/// A report as returned to clients, with the URL its document is served at.
#[derive(Debug, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub record: ReportRecord,
    pub pdf_url: String,
}

impl From<ReportRecord> for ReportView {
    fn from(record: ReportRecord) -> Self {
        let pdf_url = record.pdf_url();
        Self { record, pdf_url }
    }
}

/// Parse a numeric path segment.
pub fn parse_id(name: &str, raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("{name} must be an integer")))
}
