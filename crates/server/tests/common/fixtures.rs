//! Test fixtures for generating request bodies and failing collaborators.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use bytes::Bytes;
use residency_core::{NewReport, ReportRecord, ReportUpdate};
use residency_server::persistence::{
    MemoryReportRepository, PersistenceError, PersistenceResult, ReportRepository, UpdatedReport,
};

/// Boundary used by [`MultipartBody`].
pub const BOUNDARY: &str = "residency-test-boundary-7f3a";

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A fake PDF of `len` bytes with a valid magic header.
#[allow(dead_code)]
pub fn test_pdf(seed: u64, len: usize) -> Bytes {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.extend_from_slice(&seeded_bytes(seed, len.saturating_sub(data.len())));
    data.truncate(len);
    Bytes::from(data)
}

/// Hand-built multipart/form-data body.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// A PDF file part under the `file` field.
    pub fn pdf(self, file_name: &str, data: &[u8]) -> Self {
        self.file("file", file_name, "application/pdf", data)
    }

    /// Close the body.
    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }

    /// The body without its closing boundary, as a truncated upload looks.
    pub fn unterminated(self) -> Vec<u8> {
        self.body
    }
}

/// The scalar fields of a valid report.
#[allow(dead_code)]
pub fn report_fields(body: MultipartBody) -> MultipartBody {
    body.text("student_name", "Ana María López")
        .text("control_number", "20210044")
        .text("major", "Ingeniería en Sistemas")
        .text("report_title", "Sistema de control de residencias")
        .text("company_id", "3")
        .text("semester_id", "12")
        .text("keywords", "[1, 4]")
}

/// Build a multipart request.
#[allow(dead_code)]
pub fn multipart_request(method: &str, uri: &str, token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("Content-Length", body.len().to_string());

    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    builder.body(Body::from(body)).unwrap()
}

/// Build a body-less request.
#[allow(dead_code)]
pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Repository whose writes always fail; reads go to an inner memory store.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingReportRepository {
    inner: MemoryReportRepository,
}

#[async_trait]
impl ReportRepository for FailingReportRepository {
    async fn create(&self, _report: NewReport) -> PersistenceResult<ReportRecord> {
        Err(PersistenceError::Backend(
            "stored procedure sp_create_report failed".to_string(),
        ))
    }

    async fn update(&self, _update: ReportUpdate) -> PersistenceResult<UpdatedReport> {
        Err(PersistenceError::Backend(
            "stored procedure sp_update_report failed".to_string(),
        ))
    }

    async fn delete(&self, report_id: i64) -> PersistenceResult<ReportRecord> {
        self.inner.delete(report_id).await
    }

    async fn get(&self, report_id: i64) -> PersistenceResult<ReportRecord> {
        self.inner.get(report_id).await
    }

    async fn list(&self) -> PersistenceResult<Vec<ReportRecord>> {
        self.inner.list().await
    }

    async fn list_by_keyword(&self, keyword_id: i64) -> PersistenceResult<Vec<ReportRecord>> {
        self.inner.list_by_keyword(keyword_id).await
    }
}
