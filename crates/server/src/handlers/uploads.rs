//! Serving stored uploads.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Reject keys that name hidden files (including in-progress uploads).
fn check_key(key: &str) -> ApiResult<()> {
    let hidden = key
        .split('/')
        .any(|segment| segment.is_empty() || segment.starts_with('.'));
    if hidden {
        return Err(ApiError::NotFound(format!("upload not found: {key}")));
    }
    Ok(())
}

/// GET /uploads/{*path} - Stream a stored file.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    check_key(&key)?;

    let meta = state.storage.head(&key).await?;
    let stream = state
        .storage
        .get_stream(&key)
        .await?
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type_for(&key)),
            (CONTENT_LENGTH, &meta.size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("reports/a.PDF"), "application/pdf");
        assert_eq!(content_type_for("reports/a.bin"), "application/octet-stream");
        assert_eq!(content_type_for("reports/noext"), "application/octet-stream");
    }

    #[test]
    fn test_hidden_keys_rejected() {
        assert!(check_key("reports/a.pdf").is_ok());
        assert!(check_key("reports/.a.pdf.tmp.123").is_err());
        assert!(check_key("../etc/passwd").is_err());
        assert!(check_key("reports//a.pdf").is_err());
    }
}
