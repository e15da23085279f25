//! Liveness endpoint.

use crate::handlers::common::Envelope;
use axum::Json;
use serde_json::{Map, Value};

/// GET / - Report that the API is up.
pub async fn health_check() -> Json<Envelope<Map<String, Value>>> {
    Envelope::ok("API is running", Map::new())
}
