//! Report persistence seam.
//!
//! Handlers only see [`ReportRepository`]. Any error it returns is treated
//! as a reason to clean up the uploaded file of the failing request.

use async_trait::async_trait;
use residency_core::{NewReport, ReportRecord, ReportUpdate};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("report {0} not found")]
    NotFound(i64),

    #[error("{0}")]
    Backend(String),
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Result of an update.
#[derive(Clone, Debug)]
pub struct UpdatedReport {
    pub record: ReportRecord,
    /// Document key that the update replaced and which is no longer
    /// referenced by the record.
    pub replaced_pdf_route: Option<String>,
}

/// Storage for report rows.
#[async_trait]
pub trait ReportRepository: Send + Sync + 'static {
    /// Store a new report. Ownership of the referenced document passes to
    /// the repository once this returns `Ok`.
    async fn create(&self, report: NewReport) -> PersistenceResult<ReportRecord>;

    /// Apply a partial update.
    async fn update(&self, update: ReportUpdate) -> PersistenceResult<UpdatedReport>;

    /// Remove a report, returning the removed row.
    async fn delete(&self, report_id: i64) -> PersistenceResult<ReportRecord>;

    async fn get(&self, report_id: i64) -> PersistenceResult<ReportRecord>;

    /// All reports, ordered by id.
    async fn list(&self) -> PersistenceResult<Vec<ReportRecord>>;

    /// Reports tagged with the given keyword id, ordered by id.
    async fn list_by_keyword(&self, keyword_id: i64) -> PersistenceResult<Vec<ReportRecord>>;
}

/// Process-local report store.
///
/// Rows are lost on restart; suitable for tests and single-node demos.
#[derive(Debug)]
pub struct MemoryReportRepository {
    rows: RwLock<BTreeMap<i64, ReportRecord>>,
    next_id: AtomicI64,
}

impl Default for MemoryReportRepository {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn create(&self, report: NewReport) -> PersistenceResult<ReportRecord> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = ReportRecord::new(id, report, OffsetDateTime::now_utc());
        self.rows.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, update: ReportUpdate) -> PersistenceResult<UpdatedReport> {
        let report_id = update.report_id;
        let mut rows = self.rows.write().await;
        let record = rows
            .get_mut(&report_id)
            .ok_or(PersistenceError::NotFound(report_id))?;
        let replaced_pdf_route = record.apply(update, OffsetDateTime::now_utc());
        Ok(UpdatedReport {
            record: record.clone(),
            replaced_pdf_route,
        })
    }

    async fn delete(&self, report_id: i64) -> PersistenceResult<ReportRecord> {
        self.rows
            .write()
            .await
            .remove(&report_id)
            .ok_or(PersistenceError::NotFound(report_id))
    }

    async fn get(&self, report_id: i64) -> PersistenceResult<ReportRecord> {
        self.rows
            .read()
            .await
            .get(&report_id)
            .cloned()
            .ok_or(PersistenceError::NotFound(report_id))
    }

    async fn list(&self) -> PersistenceResult<Vec<ReportRecord>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn list_by_keyword(&self, keyword_id: i64) -> PersistenceResult<Vec<ReportRecord>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.keywords.contains(&keyword_id))
            .cloned()
            .collect())
    }
}
