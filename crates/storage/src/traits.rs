//! The seam between the HTTP layer and wherever report files live.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;

/// File contents as a chunked stream, for serving downloads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store abstraction for uploaded files.
///
/// Keys are relative paths with `/` separators, e.g. `reports/<file>`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Size of a stored file; `NotFound` if absent.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Open a stored file for chunked reading.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Start a streaming upload.
    ///
    /// Bytes are staged out of sight until [`StreamingUpload::finish`]
    /// publishes them. Publishing never replaces an existing object: if the
    /// key is taken, `finish` fails with `AlreadyExists` and the staged bytes
    /// are discarded.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Remove a stored file; `NotFound` if absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Remove staging files left behind by uploads that never finished,
    /// returning how many were removed.
    ///
    /// Only safe while no uploads are in flight, i.e. at startup.
    async fn sweep_staging(&self) -> StorageResult<usize> {
        Ok(0)
    }

    /// Where the object for `key` lives on local disk, if this backend is
    /// disk based. Does not check that the object exists.
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }

    /// Short name for log fields.
    fn backend_name(&self) -> &'static str;

    /// Fail fast at startup if the backend cannot be used.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// What `head` reports about a stored file.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    pub size: u64,
}

/// An in-progress write opened by [`ObjectStore::put_stream`].
///
/// Dropping an upload without calling `finish` or `abort` discards the
/// staged bytes.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Append a chunk.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Make the file visible under its key; returns its length.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Give up and remove whatever was staged.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
