//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Marker separating the target name from the random suffix in staging
/// file names: `.{name}.tmp.{uuid}`.
const STAGING_MARKER: &str = ".tmp.";

/// Whether a file name belongs to an in-progress (or abandoned) upload.
fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(STAGING_MARKER)
}

fn staging_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}{STAGING_MARKER}{}", Uuid::new_v4().simple()))
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Map a storage key to a path under `root`. Keys are relative, made only of
/// normal components, and may not resolve outside `root` through symlinks.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    let bad_component = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if key.is_empty() || key.contains("..") || key.starts_with(['/', '\\']) || bad_component {
        return Err(StorageError::InvalidKey(format!("unsafe key: {key}")));
    }

    let root_real = root.canonicalize()?;
    let path = root.join(key);

    // The key itself when it exists, otherwise its nearest existing ancestor;
    // create_dir_all would otherwise follow a symlinked directory out of root.
    for candidate in path.ancestors() {
        match std::fs::symlink_metadata(candidate) {
            Ok(meta) => {
                check_contained(candidate, meta.file_type().is_symlink(), &root_real, key)?;
                break;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(StorageError::Io(e)),
        }
    }

    Ok(path)
}

fn check_contained(
    candidate: &Path,
    is_symlink: bool,
    root_real: &Path,
    key: &str,
) -> StorageResult<()> {
    let real = match candidate.canonicalize() {
        Ok(real) => real,
        Err(_) if is_symlink => {
            return Err(StorageError::InvalidKey(format!("dangling symlink in key: {key}")));
        }
        Err(e) => return Err(StorageError::Io(e)),
    };
    if real.starts_with(root_real) {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(format!("key escapes uploads root: {key}")))
    }
}

/// Local filesystem object store.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating `root` if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root, off the async runtime.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(format!("resolver task: {e}"))))?
    }

    /// Ensure parent directory exists. Idempotent.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Walk the tree under `base`, calling `visit` for every regular file.
    /// Symlinks are never followed.
    async fn walk_files(
        base: PathBuf,
        mut visit: impl FnMut(PathBuf, &str) + Send,
    ) -> StorageResult<()> {
        match fs::try_exists(&base).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    visit(entry.path(), &name);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path).await.map_err(not_found_or_io(key))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(ObjectMeta {
            size: metadata.len(),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path).await.map_err(not_found_or_io(key))?;
        if !file.metadata().await?.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = staging_path(&path);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        Ok(Box::new(FilesystemUpload {
            key: key.to_string(),
            file: Some(file),
            temp_path: Some(temp_path),
            final_path: path,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(not_found_or_io(key))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn sweep_staging(&self) -> StorageResult<usize> {
        let mut stale = Vec::new();
        Self::walk_files(self.root.clone(), |path, name| {
            if is_staging_name(name) {
                stale.push(path);
            }
        })
        .await?;

        let mut removed = 0;
        for path in stale {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging file"),
            }
        }
        Ok(removed)
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        Some(self.root.join(key))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("uploads root {} unreadable: {e}", self.root.display()),
            ))
        })?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Config(format!(
                "uploads root {} is not a directory",
                self.root.display()
            )))
        }
    }
}

/// Streaming upload into a hidden staging file next to the final path.
struct FilesystemUpload {
    key: String,
    file: Option<fs::File>,
    /// `None` once the staging file has been published or removed.
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    bytes_written: u64,
}

impl FilesystemUpload {
    async fn discard(&mut self) {
        self.file.take();
        if let Some(temp_path) = self.temp_path.take()
            && let Err(e) = fs::remove_file(&temp_path).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %temp_path.display(), error = %e, "Failed to remove staging file");
        }
    }

    /// Link the staging file into place without replacing an existing file.
    async fn publish(&self, temp_path: &Path) -> StorageResult<()> {
        match fs::hard_link(temp_path, &self.final_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(self.key.clone()))
            }
            Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
                // Filesystems without hard links: check then rename.
                debug!(error = %e, "hard_link unavailable, falling back to rename");
                if fs::try_exists(&self.final_path).await? {
                    return Err(StorageError::AlreadyExists(self.key.clone()));
                }
                fs::rename(temp_path, &self.final_path).await?;
                Ok(())
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            StorageError::Io(std::io::Error::other("upload already closed"))
        })?;
        file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let synced = match self.file.take() {
            Some(mut file) => async {
                file.flush().await?;
                file.sync_all().await
            }
            .await
            .map_err(StorageError::Io),
            None => Err(StorageError::Io(std::io::Error::other("upload already closed"))),
        };
        if let Err(e) = synced {
            self.discard().await;
            return Err(e);
        }

        let Some(temp_path) = self.temp_path.clone() else {
            return Err(StorageError::Io(std::io::Error::other("upload already closed")));
        };
        let published = self.publish(&temp_path).await;
        // After a hard link both names point at the data; after the rename
        // fallback the staging name is already gone.
        self.discard().await;
        published?;
        Ok(self.bytes_written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.discard().await;
        Ok(())
    }
}

impl Drop for FilesystemUpload {
    fn drop(&mut self) {
        let Some(temp_path) = self.temp_path.take() else {
            return;
        };
        self.file.take();

        let remove = move || {
            if let Err(e) = std::fs::remove_file(&temp_path)
                && e.kind() != ErrorKind::NotFound
            {
                warn!(path = %temp_path.display(), error = %e, "Failed to remove abandoned staging file");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, backend)
    }

    #[test]
    fn test_staging_names() {
        let path = staging_path(Path::new("/x/reports/a.pdf"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".a.pdf.tmp."));
        assert!(is_staging_name(&name));
        assert!(!is_staging_name("a.pdf"));
        assert!(!is_staging_name("report.tmp.pdf"));
    }

    #[tokio::test]
    async fn test_head_sees_only_published_files() {
        let (_dir, backend) = store().await;
        let key = "reports/object.pdf";

        let mut upload = backend.put_stream(key).await.unwrap();
        upload.write(Bytes::from_static(b"%PDF-1.7 body")).await.unwrap();
        assert!(backend.head(key).await.unwrap_err().is_not_found());

        assert_eq!(upload.finish().await.unwrap(), 13);
        assert_eq!(backend.head(key).await.unwrap().size, 13);
        assert!(backend.head("reports").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, backend) = store().await;

        let unsafe_keys = [
            "../a.pdf",
            "/etc/passwd",
            "reports/../a.pdf",
            "reports/../../x",
            "",
            "\\share\\a.pdf",
        ];
        for key in unsafe_keys {
            assert!(
                matches!(backend.head(key).await, Err(StorageError::InvalidKey(_))),
                "accepted {key:?}"
            );
        }
        assert!(backend.put_stream("../outside.pdf").await.is_err());
        assert!(backend.head("reports/2024/a.pdf").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let (dir, backend) = store().await;
        let outside = tempfile::tempdir().unwrap();
        let outside_file = outside.path().join("grades.pdf");
        std::fs::write(&outside_file, "%PDF-private").unwrap();

        symlink(&outside_file, dir.path().join("leak.pdf")).unwrap();

        match backend.get_stream("leak.pdf").await {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes uploads root")),
            Err(other) => panic!("expected InvalidKey error, got: {other:?}"),
            Ok(_) => panic!("expected InvalidKey error, got a stream"),
        }

        symlink(outside.path(), dir.path().join("reports")).unwrap();
        assert!(backend.get_stream("reports/grades.pdf").await.is_err());
        assert!(backend.delete("reports/grades.pdf").await.is_err());
        assert!(outside_file.exists());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_ancestor_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let (dir, backend) = store().await;
        let outside = tempfile::tempdir().unwrap();
        symlink(outside.path(), dir.path().join("reports")).unwrap();

        let result = backend.put_stream("reports/2024/a.pdf").await;
        match result {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes uploads root")),
            Err(other) => panic!("expected InvalidKey error, got: {other:?}"),
            Ok(_) => panic!("expected InvalidKey error, got an upload"),
        }
        assert!(!outside.path().join("2024").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, backend) = store().await;
        let err = backend.delete("reports/none.pdf").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
