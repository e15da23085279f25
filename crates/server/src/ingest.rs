//! Streaming multipart ingestion.
//!
//! Reads a multipart body part by part in arrival order. Scalar parts go
//! into a [`FieldBag`] as raw strings; the single file part is streamed
//! chunk by chunk into storage and handed to the [`IngestionGuard`] as soon
//! as it is published. Nothing is coerced here.

use crate::error::{ApiError, ApiResult};
use crate::guard::IngestionGuard;
use crate::metrics;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use bytes::{Bytes, BytesMut};
use residency_core::config::UploadsConfig;
use residency_core::{ArtifactName, FieldBag, StagedArtifact};
use residency_storage::{ObjectStore, StreamingUpload};
use std::time::Instant;

/// Header of one multipart part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartHeader {
    pub name: Option<String>,
    /// Present for file parts.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl PartHeader {
    /// A part with a `filename` disposition parameter is a file.
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }
}

/// A lazy, finite, non-restartable sequence of parts.
///
/// `next_chunk` yields the body of the part last returned by `next_part`;
/// advancing to the next part skips whatever is left of the current one.
#[async_trait]
pub trait PartSource: Send {
    async fn next_part(&mut self) -> ApiResult<Option<PartHeader>>;

    async fn next_chunk(&mut self) -> ApiResult<Option<Bytes>>;
}

/// [`PartSource`] over an HTTP request body.
pub struct MultipartSource {
    multipart: multer::Multipart<'static>,
    current: Option<multer::Field<'static>>,
}

impl MultipartSource {
    /// Check the request headers and wrap the body.
    ///
    /// Fails with `NotMultipart` if the content type is not multipart with
    /// a boundary, and with `PayloadTooLarge` if the declared length is over
    /// `max_body_bytes`. The limit is enforced again while streaming, since
    /// the declared length may be absent or wrong.
    pub fn from_request(headers: &HeaderMap, body: Body, max_body_bytes: u64) -> ApiResult<Self> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::NotMultipart)?;
        let boundary = multer::parse_boundary(content_type).map_err(|_| ApiError::NotMultipart)?;

        if let Some(declared) = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            && declared > max_body_bytes
        {
            return Err(ApiError::PayloadTooLarge(format!(
                "request body of {declared} bytes exceeds limit of {max_body_bytes} bytes"
            )));
        }

        let constraints = multer::Constraints::new()
            .size_limit(multer::SizeLimit::new().whole_stream(max_body_bytes));
        let multipart =
            multer::Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

        Ok(Self {
            multipart,
            current: None,
        })
    }
}

fn stream_error(err: multer::Error) -> ApiError {
    match err {
        multer::Error::StreamSizeExceeded { limit } => {
            ApiError::Stream(format!("request body exceeds limit of {limit} bytes"))
        }
        other => ApiError::Stream(other.to_string()),
    }
}

#[async_trait]
impl PartSource for MultipartSource {
    async fn next_part(&mut self) -> ApiResult<Option<PartHeader>> {
        // The previous field must be released before multer yields the next.
        self.current = None;
        let Some(field) = self.multipart.next_field().await.map_err(stream_error)? else {
            return Ok(None);
        };
        let header = PartHeader {
            name: field.name().map(str::to_string),
            file_name: field.file_name().map(str::to_string),
            content_type: field.content_type().map(|m| m.to_string()),
        };
        self.current = Some(field);
        Ok(Some(header))
    }

    async fn next_chunk(&mut self) -> ApiResult<Option<Bytes>> {
        match self.current.as_mut() {
            Some(field) => field.chunk().await.map_err(stream_error),
            None => Ok(None),
        }
    }
}

enum IngestState {
    AwaitingPart,
    Done,
    Failed(ApiError),
}

/// Turns a part sequence into a field bag plus at most one stored file.
pub struct IngestPipeline<'a> {
    store: &'a dyn ObjectStore,
    config: &'a UploadsConfig,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(store: &'a dyn ObjectStore, config: &'a UploadsConfig) -> Self {
        Self { store, config }
    }

    /// Consume `source` to the end.
    ///
    /// A file that was published before a later failure stays registered
    /// with `guard`, which is responsible for deleting it.
    pub async fn run<S>(&self, source: &mut S, guard: &mut IngestionGuard) -> ApiResult<FieldBag>
    where
        S: PartSource + ?Sized,
    {
        let started = Instant::now();
        let mut fields = FieldBag::new();
        let mut state = IngestState::AwaitingPart;

        loop {
            state = match state {
                IngestState::AwaitingPart => match source.next_part().await {
                    Ok(None) => IngestState::Done,
                    Ok(Some(header)) => match self.handle_part(source, header, &mut fields, guard).await {
                        Ok(()) => IngestState::AwaitingPart,
                        Err(e) => IngestState::Failed(e),
                    },
                    Err(e) => IngestState::Failed(e),
                },
                IngestState::Done => {
                    metrics::INGEST_DURATION.observe(started.elapsed().as_secs_f64());
                    return Ok(fields);
                }
                IngestState::Failed(e) => {
                    tracing::debug!(code = e.code(), error = %e, "Multipart ingestion failed");
                    return Err(e);
                }
            };
        }
    }

    async fn handle_part<S>(
        &self,
        source: &mut S,
        header: PartHeader,
        fields: &mut FieldBag,
        guard: &mut IngestionGuard,
    ) -> ApiResult<()>
    where
        S: PartSource + ?Sized,
    {
        if header.is_file() {
            if guard.artifact().is_some() {
                return Err(ApiError::MultipleFilesNotAllowed);
            }
            let artifact = self.stage_file(source, header).await?;
            guard.stage(artifact);
            return Ok(());
        }

        let Some(name) = header.name else {
            tracing::debug!("Skipping unnamed multipart part");
            return Ok(());
        };
        let value = read_text(source, &name, self.config.max_text_field_bytes).await?;
        fields.insert(name, value);
        Ok(())
    }

    async fn stage_file<S>(&self, source: &mut S, header: PartHeader) -> ApiResult<StagedArtifact>
    where
        S: PartSource + ?Sized,
    {
        if !self.config.accepts_content_type(header.content_type.as_deref()) {
            return Err(ApiError::UnsupportedMediaType(
                header
                    .content_type
                    .unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        let file_name = ArtifactName::generate(header.file_name.as_deref()).to_string();
        let key = format!("{}/{}", self.config.category, file_name);
        let mut upload = self.store.put_stream(&key).await?;

        if let Err(e) = copy_body(source, upload.as_mut()).await {
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(key = %key, error = %abort_err, "Failed to abort partial upload");
            }
            return Err(e);
        }
        let size = upload.finish().await?;

        metrics::ARTIFACTS_STAGED.inc();
        metrics::BYTES_INGESTED.inc_by(size);
        tracing::info!(key = %key, size, "Stored uploaded file");

        Ok(StagedArtifact {
            field_name: header.name.unwrap_or_default(),
            original_file_name: header.file_name,
            file_name,
            physical_path: self.store.local_path(&key),
            key,
            content_type: header.content_type,
            size,
        })
    }
}

async fn copy_body<S>(source: &mut S, upload: &mut dyn StreamingUpload) -> ApiResult<()>
where
    S: PartSource + ?Sized,
{
    while let Some(chunk) = source.next_chunk().await? {
        upload.write(chunk).await?;
    }
    Ok(())
}

async fn read_text<S>(source: &mut S, name: &str, limit: usize) -> ApiResult<String>
where
    S: PartSource + ?Sized,
{
    let mut buf = BytesMut::new();
    while let Some(chunk) = source.next_chunk().await? {
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(format!(
                "field '{name}' exceeds limit of {limit} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf.to_vec()).map_err(|_| {
        ApiError::FieldParse(residency_core::Error::FieldParse {
            field: name.to_string(),
            reason: "not valid UTF-8".to_string(),
        })
    })
}
