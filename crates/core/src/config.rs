//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes. Larger uploads are rejected
    /// before ingestion starts when the client declares a Content-Length,
    /// and mid-stream otherwise.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: false).
    /// The route is mounted outside the admission gate, so restrict it to
    /// the scraper at the network level.
    #[serde(default)]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> u64 {
    crate::DEFAULT_MAX_BODY_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            metrics_enabled: false,
        }
    }
}

/// Authentication configuration consumed by the admission gate.
///
/// Immutable after startup. The gate is built once from this value and
/// handed to the router; nothing mutates the public route list at runtime.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify bearer tokens (HS256).
    /// WARNING: Prefer RESIDENCY_AUTH__JWT_SECRET over storing it in a file.
    pub jwt_secret: String,
    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Require the `api-key` header on authenticated requests.
    #[serde(default)]
    pub api_key_enabled: bool,
    /// The static API key. When `api_key_enabled` is true but this is unset,
    /// the key check is disabled (not failed open) and a warning is logged
    /// at startup.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Ordered path prefixes exempt from authentication. Matching is a
    /// literal prefix comparison, so "/uploads/" covers every stored file.
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,
}

fn default_token_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_public_routes() -> Vec<String> {
    vec![
        "/api/users/login".to_string(),
        "/api/users/refresh-token".to_string(),
        "/api/users/logout".to_string(),
        "/api/users/request-password-reset".to_string(),
        "/api/users/reset-password".to_string(),
        "/uploads/".to_string(),
    ]
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("api_key_enabled", &self.api_key_enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("public_routes", &self.public_routes)
            .finish()
    }
}

/// Minimum secret length before a warning is emitted.
const MIN_SECRET_LEN: usize = 32;

impl AuthConfig {
    /// Create a test configuration with a fixed secret.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            jwt_secret: "test-secret-do-not-use-in-production-0123456789".to_string(),
            token_ttl_secs: default_token_ttl_secs(),
            api_key_enabled: false,
            api_key: None,
            public_routes: default_public_routes(),
        }
    }

    /// Get the token lifetime as a Duration.
    pub fn token_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.token_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// The API key to enforce, if the feature is both enabled and configured.
    pub fn effective_api_key(&self) -> Option<&str> {
        if self.api_key_enabled {
            self.api_key.as_deref().filter(|k| !k.is_empty())
        } else {
            None
        }
    }

    /// Validate auth configuration.
    /// Returns warnings for configs that are weak but allowed,
    /// and errors for configs that would disable authentication by accident.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.jwt_secret.is_empty() {
            return Err("auth.jwt_secret must not be empty".to_string());
        }

        // An empty prefix matches every path and would exempt the whole API.
        if let Some(pos) = self.public_routes.iter().position(|p| p.is_empty()) {
            return Err(format!(
                "auth.public_routes[{pos}] is empty, which would exempt every route"
            ));
        }

        if self.jwt_secret.len() < MIN_SECRET_LEN {
            warnings.push(format!(
                "auth.jwt_secret is shorter than {MIN_SECRET_LEN} bytes; \
                 use a longer random secret"
            ));
        }

        for prefix in &self.public_routes {
            if !prefix.starts_with('/') {
                warnings.push(format!(
                    "auth.public_routes entry '{prefix}' does not start with '/' \
                     and will never match a request path"
                ));
            }
        }

        if self.api_key_enabled && self.effective_api_key().is_none() {
            warnings.push(
                "auth.api_key_enabled is true but no auth.api_key is configured; \
                 API key checking is disabled"
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Upload storage and ingestion configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Root directory for uploaded files. Served under `/uploads/`.
    #[serde(default = "default_uploads_root")]
    pub root: PathBuf,
    /// Sub-directory that report files are written to.
    #[serde(default = "default_category")]
    pub category: String,
    /// Accepted content types for file parts. Empty means no restriction.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
    /// Maximum size of a single scalar form field in bytes.
    #[serde(default = "default_max_text_field_bytes")]
    pub max_text_field_bytes: usize,
    /// Upper bound on the time spent ingesting one request body.
    #[serde(default = "default_ingest_timeout_secs")]
    pub ingest_timeout_secs: u64,
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_category() -> String {
    "reports".to_string()
}

fn default_allowed_content_types() -> Vec<String> {
    vec!["application/pdf".to_string()]
}

fn default_max_text_field_bytes() -> usize {
    crate::DEFAULT_MAX_TEXT_FIELD_BYTES
}

fn default_ingest_timeout_secs() -> u64 {
    300 // 5 minutes
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: default_uploads_root(),
            category: default_category(),
            allowed_content_types: default_allowed_content_types(),
            max_text_field_bytes: default_max_text_field_bytes(),
            ingest_timeout_secs: default_ingest_timeout_secs(),
        }
    }
}

impl UploadsConfig {
    /// Get the ingestion timeout as a std::time::Duration.
    pub fn ingest_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ingest_timeout_secs)
    }

    /// Whether a file part with this content type may be stored.
    ///
    /// Parameters such as `; charset=...` are ignored and the comparison is
    /// case-insensitive.
    pub fn accepts_content_type(&self, content_type: Option<&str>) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }
        let Some(content_type) = content_type else {
            return false;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        let mut components = Path::new(&self.category).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(format!(
                    "uploads.category '{}' must be a single directory name",
                    self.category
                ));
            }
        }
        if self.category.starts_with('.') {
            return Err(format!(
                "uploads.category '{}' must not be a hidden directory",
                self.category
            ));
        }
        if self.max_text_field_bytes == 0 {
            return Err("uploads.max_text_field_bytes cannot be 0".to_string());
        }
        if self.ingest_timeout_secs == 0 {
            return Err("uploads.ingest_timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication configuration (required: the token secret has no default).
    pub auth: AuthConfig,
    /// Upload configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses a fixed token secret and `./uploads`.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::for_testing(),
            uploads: UploadsConfig::default(),
        }
    }

    /// Validate every section. Returns the collected warnings.
    pub fn validate(&self) -> crate::Result<Vec<String>> {
        let warnings = self.auth.validate().map_err(crate::Error::Config)?;
        self.uploads.validate().map_err(crate::Error::Config)?;
        if self.server.max_body_bytes == 0 {
            return Err(crate::Error::Config(
                "server.max_body_bytes cannot be 0".to_string(),
            ));
        }
        Ok(warnings)
    }
}
