//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/", get(handlers::health_check))
        .route("/api/reports/create", post(handlers::create_report))
        .route(
            "/api/reports/update/{report_id}",
            put(handlers::update_report),
        )
        .route(
            "/api/reports/delete/{report_id}",
            delete(handlers::delete_report),
        )
        .route("/api/reports/list", get(handlers::list_reports))
        .route(
            "/api/reports/keyword/{keyword_id}",
            get(handlers::list_reports_by_keyword),
        )
        // Public by default through the configured exempt prefixes.
        .route("/uploads/{*path}", get(handlers::get_upload))
        // Every route above passes the admission gate first.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let mut router = Router::new().merge(api_routes);

    // SECURITY: when enabled, /metrics is outside the gate and MUST be
    // network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
