//! Application state shared across handlers.

use crate::auth::AdmissionGate;
use crate::persistence::ReportRepository;
use residency_core::config::AppConfig;
use residency_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Upload storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Report persistence.
    pub reports: Arc<dyn ReportRepository>,
    /// Admission gate run by the auth middleware.
    pub gate: AdmissionGate,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Validates the configuration and logs its warnings. The gate is
    /// built here, once, from the auth section.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        reports: Arc<dyn ReportRepository>,
    ) -> residency_core::Result<Self> {
        for warning in config.validate()? {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let gate = AdmissionGate::from_config(&config.auth);
        tracing::info!(
            public_routes = ?gate.public_routes().prefixes(),
            api_key = config.auth.api_key_enabled,
            "Admission gate configured"
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            reports,
            gate,
        })
    }
}
