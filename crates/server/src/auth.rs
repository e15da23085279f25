//! Admission gate: decides, before any handler runs, whether a request may
//! proceed and with which identity.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use residency_core::config::AuthConfig;
use residency_core::{ApiKeyPolicy, JwtVerifier, Principal, PublicRoutes, TokenError, VerifyToken};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Header carrying the secondary static key.
pub const API_KEY_HEADER: &str = "api-key";

/// Request correlation header, read from the client and echoed back.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value: truncated to
    /// MAX_TRACE_ID_LEN characters, printable ASCII only.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal non-rejecting outcome of the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Public route; no credentials were looked at.
    Exempt,
    /// Credentials verified.
    Authenticated(Principal),
}

/// Per-request admission decision.
///
/// Built once at startup from immutable configuration. Checks run in a
/// fixed order: public-route exemption, then the bearer token, then the
/// static key (only once a principal exists and key checking is on).
#[derive(Clone)]
pub struct AdmissionGate {
    public_routes: Arc<PublicRoutes>,
    verifier: Arc<dyn VerifyToken>,
    api_keys: ApiKeyPolicy,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("public_routes", &self.public_routes)
            .field("api_keys", &self.api_keys)
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    pub fn new(
        public_routes: PublicRoutes,
        verifier: Arc<dyn VerifyToken>,
        api_keys: ApiKeyPolicy,
    ) -> Self {
        Self {
            public_routes: Arc::new(public_routes),
            verifier,
            api_keys,
        }
    }

    /// Build the gate from auth configuration with an HS256 verifier.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            PublicRoutes::new(config.public_routes.iter().cloned()),
            Arc::new(JwtVerifier::from_config(config)),
            ApiKeyPolicy::from_key(config.effective_api_key()),
        )
    }

    pub fn public_routes(&self) -> &PublicRoutes {
        &self.public_routes
    }

    /// Decide admission for a request path and its headers.
    pub fn admit(&self, path: &str, headers: &HeaderMap) -> Result<Admission, TokenError> {
        if self.public_routes.is_public(path) {
            return Ok(Admission::Exempt);
        }

        let token = extract_bearer_token(headers).ok_or(TokenError::Missing)?;
        let principal = self.verifier.verify(token)?;

        let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        self.api_keys.verify(api_key, &principal)?;

        Ok(Admission::Authenticated(principal))
    }
}

/// Extract bearer token from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v.is_char_boundary(7) && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|t| !t.is_empty())
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

fn outcome_label(err: &TokenError) -> &'static str {
    match err {
        TokenError::Missing => "missing",
        TokenError::Malformed => "malformed",
        TokenError::Expired => "expired",
        TokenError::Invalid => "invalid",
        TokenError::ApiKeyMissing => "api_key_missing",
        TokenError::ApiKeyInvalid => "api_key_invalid",
        TokenError::Internal(_) => "internal",
    }
}

/// Admission middleware: sets up the trace span, runs the gate and attaches
/// the principal. Rejections never reach the handler. Every response, a
/// rejection included, carries the trace id back in `x-trace-id`.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        subject = tracing::field::Empty
    );

    let mut response = match state.gate.admit(req.uri().path(), req.headers()) {
        Ok(admission) => {
            match admission {
                Admission::Exempt => metrics::record_admission("exempt"),
                Admission::Authenticated(principal) => {
                    metrics::record_admission("authenticated");
                    span.record("subject", principal.subject.as_str());
                    req.extensions_mut().insert(principal);
                }
            }
            next.run(req).instrument(span).await
        }
        Err(err) => {
            metrics::record_admission(outcome_label(&err));
            match &err {
                TokenError::Internal(detail) => {
                    tracing::error!(parent: &span, path = %req.uri().path(), error = %detail, "Credential verifier fault");
                }
                other => {
                    tracing::debug!(parent: &span, path = %req.uri().path(), reason = %other, "Request rejected");
                }
            }
            ApiError::from(err).into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// Require the principal the gate attached.
pub fn require_principal(principal: Option<&Principal>) -> ApiResult<&Principal> {
    principal.ok_or(ApiError::AuthMissing)
}
