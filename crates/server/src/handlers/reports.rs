//! Report endpoints.
//!
//! Create and update consume a multipart body through the ingestion
//! pipeline. The uploaded file stays under an [`IngestionGuard`] until the
//! repository call returns, so every failure path deletes it.

use crate::auth::require_principal;
use crate::error::{ApiError, ApiResult};
use crate::guard::{IngestionGuard, discard_stored};
use crate::handlers::common::{Envelope, ReportView, parse_id};
use crate::ingest::{IngestPipeline, MultipartSource};
use crate::persistence::UpdatedReport;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use residency_core::{FieldBag, NewReport, Principal, ReportRecord, ReportUpdate};

/// Read the whole multipart body, bounded by the configured timeout.
async fn ingest(
    state: &AppState,
    source: &mut MultipartSource,
    guard: &mut IngestionGuard,
) -> ApiResult<FieldBag> {
    let uploads = &state.config.uploads;
    let pipeline = IngestPipeline::new(state.storage.as_ref(), uploads);
    tokio::time::timeout(uploads.ingest_timeout(), pipeline.run(source, guard))
        .await
        .map_err(|_| {
            ApiError::Stream(format!(
                "upload did not complete within {}s",
                uploads.ingest_timeout_secs
            ))
        })?
}

fn open_source(state: &AppState, req: Request) -> ApiResult<MultipartSource> {
    let (parts, body) = req.into_parts();
    MultipartSource::from_request(&parts.headers, body, state.config.server.max_body_bytes)
}

async fn ingest_new_report(
    state: &AppState,
    source: &mut MultipartSource,
    guard: &mut IngestionGuard,
) -> ApiResult<ReportRecord> {
    let fields = ingest(state, source, guard).await?;
    let artifact = guard.artifact().ok_or(ApiError::NoFileProvided)?;
    let report = NewReport::from_fields(&fields, artifact.key.clone())?;
    Ok(state.reports.create(report).await?)
}

async fn ingest_report_update(
    state: &AppState,
    report_id: i64,
    source: &mut MultipartSource,
    guard: &mut IngestionGuard,
) -> ApiResult<UpdatedReport> {
    let fields = ingest(state, source, guard).await?;
    let pdf_route = guard.artifact().map(|a| a.key.clone());
    let update = ReportUpdate::from_fields(report_id, &fields, pdf_route)?;
    if update.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }
    Ok(state.reports.update(update).await?)
}

/// POST /api/reports/create - Create a report with its PDF.
#[tracing::instrument(skip_all, fields(report_id))]
pub async fn create_report(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Envelope<ReportView>>)> {
    let subject = require_principal(req.extensions().get::<Principal>())?
        .subject
        .clone();
    let mut source = open_source(&state, req)?;
    let mut guard = IngestionGuard::new(state.storage.clone());

    let result = ingest_new_report(&state, &mut source, &mut guard).await;
    let record = guard.settle(result).await?;

    tracing::Span::current().record("report_id", record.report_id);
    tracing::info!(subject = %subject, pdf_route = %record.pdf_route, "Report created");

    Ok(Envelope::created(
        "Report created successfully",
        ReportView::from(record),
    ))
}

/// PUT /api/reports/update/{report_id} - Update fields and optionally
/// replace the PDF.
///
/// Without a file part the stored document is left alone. With one, the
/// previous document is deleted after the update is persisted.
#[tracing::instrument(skip_all, fields(report_id = %report_id))]
pub async fn update_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    req: Request,
) -> ApiResult<Json<Envelope<ReportView>>> {
    let subject = require_principal(req.extensions().get::<Principal>())?
        .subject
        .clone();
    let report_id = parse_id("report_id", &report_id)?;
    let mut source = open_source(&state, req)?;
    let mut guard = IngestionGuard::new(state.storage.clone());

    let result = ingest_report_update(&state, report_id, &mut source, &mut guard).await;
    let updated = guard.settle(result).await?;

    if let Some(old) = &updated.replaced_pdf_route {
        discard_stored(state.storage.as_ref(), old, "replaced by update").await;
    }
    tracing::info!(subject = %subject, "Report updated");

    Ok(Envelope::ok(
        "Report updated successfully",
        ReportView::from(updated.record),
    ))
}

/// DELETE /api/reports/delete/{report_id}
pub async fn delete_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    req: Request,
) -> ApiResult<Json<Envelope<ReportView>>> {
    let subject = require_principal(req.extensions().get::<Principal>())?
        .subject
        .clone();
    let report_id = parse_id("report_id", &report_id)?;

    let record = state.reports.delete(report_id).await?;
    discard_stored(state.storage.as_ref(), &record.pdf_route, "report deleted").await;
    tracing::info!(report_id, subject = %subject, "Report deleted");

    Ok(Envelope::ok(
        "Report deleted successfully",
        ReportView::from(record),
    ))
}

/// GET /api/reports/list
pub async fn list_reports(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Envelope<Vec<ReportView>>>> {
    require_principal(req.extensions().get::<Principal>())?;
    let reports = state.reports.list().await?;
    Ok(Envelope::ok(
        "Reports retrieved successfully",
        reports.into_iter().map(ReportView::from).collect(),
    ))
}

/// GET /api/reports/keyword/{keyword_id}
pub async fn list_reports_by_keyword(
    State(state): State<AppState>,
    Path(keyword_id): Path<String>,
    req: Request,
) -> ApiResult<Json<Envelope<Vec<ReportView>>>> {
    require_principal(req.extensions().get::<Principal>())?;
    let keyword_id = parse_id("keyword_id", &keyword_id)?;
    let reports = state.reports.list_by_keyword(keyword_id).await?;
    Ok(Envelope::ok(
        "Reports retrieved successfully",
        reports.into_iter().map(ReportView::from).collect(),
    ))
}
