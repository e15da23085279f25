//! Prometheus metrics for the residency server.
//!
//! Counts admission decisions, staged upload files, cleanups and ingestion
//! failures. Labels never carry user data (no paths, names or tokens).
//!
//! The `/metrics` endpoint is unauthenticated when enabled and should be
//! network-restricted to the scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Admission gate
pub static ADMISSION_DECISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "residency_admission_decisions_total",
            "Admission gate decisions by outcome",
        ),
        &["outcome"],
    )
    .expect("valid metric definition")
});

// Ingestion
pub static ARTIFACTS_STAGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "residency_artifacts_staged_total",
        "Total number of uploaded files written to storage",
    )
    .expect("valid metric definition")
});

pub static BYTES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "residency_bytes_ingested_total",
        "Total bytes of uploaded files written to storage",
    )
    .expect("valid metric definition")
});

pub static INGEST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "residency_ingest_duration_seconds",
            "Time taken to read a multipart upload",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
    )
    .expect("valid metric definition")
});

pub static INGEST_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "residency_ingest_errors_total",
            "Failed upload requests by error code",
        ),
        &["code"],
    )
    .expect("valid metric definition")
});

// Cleanup
pub static ARTIFACTS_CLEANED_UP: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "residency_artifacts_cleaned_up_total",
        "Uploaded files deleted because their request failed",
    )
    .expect("valid metric definition")
});

pub static CLEANUP_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "residency_cleanup_failures_total",
        "Failed attempts to delete an orphaned upload file",
    )
    .expect("valid metric definition")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: [Box<dyn Collector>; 7] = [
            Box::new(ADMISSION_DECISIONS.clone()),
            Box::new(ARTIFACTS_STAGED.clone()),
            Box::new(BYTES_INGESTED.clone()),
            Box::new(INGEST_DURATION.clone()),
            Box::new(INGEST_ERRORS.clone()),
            Box::new(ARTIFACTS_CLEANED_UP.clone()),
            Box::new(CLEANUP_FAILURES.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("residency metric registered twice");
        }
    });
}

/// `GET /metrics`, mounted outside the admission gate.
pub async fn metrics_handler() -> impl IntoResponse {
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("metrics encoding failed: {e}").into_bytes(),
        ),
    }
}

/// Record an admission gate outcome.
pub fn record_admission(outcome: &str) {
    ADMISSION_DECISIONS.with_label_values(&[outcome]).inc();
}

/// Record a failed upload request by error code.
pub fn record_ingest_error(code: &str) {
    INGEST_ERRORS.with_label_values(&[code]).inc();
}
