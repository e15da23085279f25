//! Staged artifact types and upload file naming.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// URL prefix under which stored uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

/// Fallback name used when sanitizing leaves nothing usable.
const FALLBACK_FILE_NAME: &str = "upload";

/// Maximum length in bytes kept from a client-supplied file name.
///
/// The stored name adds a 33-byte time prefix and the staging file another
/// 38 bytes of decoration; both must stay under the 255-byte NAME_MAX.
pub const MAX_ORIGINAL_NAME_BYTES: usize = 150;

/// Longest suffix still treated as an extension when truncating.
const MAX_EXTENSION_BYTES: usize = 16;

/// Unique name for a file written during ingestion.
///
/// Rendered as `{time-component}-{original}` where the time component is a
/// UUIDv7: a millisecond timestamp followed by random bits. Two requests
/// uploading the same original name in the same millisecond still get
/// distinct names, and names sort by creation time.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Generate a fresh name for a client-supplied file name.
    pub fn generate(original: Option<&str>) -> Self {
        let original = sanitize_file_name(original.unwrap_or_default());
        Self(format!("{}-{}", Uuid::now_v7().simple(), original))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactName({})", self.0)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a client-supplied file name to a single safe path component.
///
/// Directory parts (either separator), control characters and leading dots
/// are removed; an empty result becomes `upload`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_end();

    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        truncate_keeping_extension(cleaned, MAX_ORIGINAL_NAME_BYTES)
    }
}

/// Cut `name` to at most `max` bytes on a char boundary, keeping a short
/// extension intact.
fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };
    let mut end = max.saturating_sub(ext.len()).min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &stem[..end])
}

/// A file written to storage during ingestion.
///
/// Its ownership is conditional: the request that staged it owns it until
/// persistence succeeds, and deletes it on any failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    /// Name of the multipart field that carried the file.
    pub field_name: String,
    /// File name as sent by the client (unsanitized, for display only).
    pub original_file_name: Option<String>,
    /// Generated unique file name.
    pub file_name: String,
    /// Storage key relative to the uploads root, e.g. `reports/<file_name>`.
    pub key: String,
    /// Location on disk, when the backend is filesystem based.
    pub physical_path: Option<PathBuf>,
    /// Declared content type of the part.
    pub content_type: Option<String>,
    /// Bytes written.
    pub size: u64,
}

impl StagedArtifact {
    /// URL path the artifact is served under.
    pub fn public_path(&self) -> String {
        public_path_for(&self.key)
    }
}

/// URL path for a storage key.
pub fn public_path_for(key: &str) -> String {
    format!("{UPLOADS_URL_PREFIX}{}", key.trim_start_matches('/'))
}
