// Streaming upload tests: staging, atomic publish, no-clobber and cleanup.

mod common;

use bytes::Bytes;
use common::{read_file, seeded_bytes, staging_files, store_file};
use residency_storage::{FilesystemBackend, ObjectStore, StorageError};
use std::sync::Arc;
use tempfile::TempDir;

async fn backend() -> (TempDir, FilesystemBackend) {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(dir.path()).await.unwrap();
    (dir, backend)
}

#[tokio::test]
async fn test_streamed_chunks_roundtrip() {
    let (_dir, backend) = backend().await;
    let data = seeded_bytes(7, 3 * 1024 * 1024 + 17);

    let mut upload = backend.put_stream("reports/big.pdf").await.unwrap();
    for chunk in data.chunks(64 * 1024) {
        upload.write(Bytes::copy_from_slice(chunk)).await.unwrap();
    }
    let written = upload.finish().await.unwrap();
    assert_eq!(written, data.len() as u64);

    assert_eq!(read_file(&backend, "reports/big.pdf").await, data.as_ref());
}

#[tokio::test]
async fn test_partial_upload_is_invisible() {
    let (dir, backend) = backend().await;

    let mut upload = backend.put_stream("reports/partial.pdf").await.unwrap();
    upload.write(Bytes::from_static(b"%PDF-1.7 ")).await.unwrap();

    assert!(backend.head("reports/partial.pdf").await.unwrap_err().is_not_found());
    assert_eq!(staging_files(dir.path()).len(), 1);

    upload.finish().await.unwrap();
    assert_eq!(read_file(&backend, "reports/partial.pdf").await, b"%PDF-1.7 ");
    assert!(staging_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_abort_removes_staging_file() {
    let (dir, backend) = backend().await;

    let mut upload = backend.put_stream("reports/aborted.pdf").await.unwrap();
    upload.write(seeded_bytes(1, 4096)).await.unwrap();
    upload.abort().await.unwrap();

    assert!(backend.head("reports/aborted.pdf").await.unwrap_err().is_not_found());
    assert!(staging_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_dropped_upload_removes_staging_file() {
    let (dir, backend) = backend().await;

    let mut upload = backend.put_stream("reports/dropped.pdf").await.unwrap();
    upload.write(seeded_bytes(2, 4096)).await.unwrap();
    drop(upload);

    assert!(backend.head("reports/dropped.pdf").await.unwrap_err().is_not_found());
    // Removal runs on the blocking pool.
    for _ in 0..100 {
        if staging_files(dir.path()).is_empty() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("dropped upload left its staging file behind");
}

#[tokio::test]
async fn test_finish_never_overwrites() {
    let (dir, backend) = backend().await;
    store_file(&backend, "reports/taken.pdf", b"original").await;

    let mut upload = backend.put_stream("reports/taken.pdf").await.unwrap();
    upload.write(Bytes::from_static(b"intruder")).await.unwrap();
    let err = upload.finish().await.unwrap_err();

    assert!(matches!(err, StorageError::AlreadyExists(_)), "{err:?}");
    assert_eq!(read_file(&backend, "reports/taken.pdf").await, b"original");
    assert!(staging_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_concurrent_uploads_same_key_one_wins() {
    let (_dir, backend) = backend().await;
    let backend = Arc::new(backend);

    let mut handles = Vec::new();
    for seed in 0..8u64 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            let data = seeded_bytes(seed, 256 * 1024);
            let mut upload = backend.put_stream("reports/race.pdf").await?;
            for chunk in data.chunks(16 * 1024) {
                upload.write(Bytes::copy_from_slice(chunk)).await?;
            }
            upload.finish().await.map(|_| data)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(data) => winners.push(data),
            Err(StorageError::AlreadyExists(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(read_file(&*backend, "reports/race.pdf").await, winners[0].as_ref());
}

#[tokio::test]
async fn test_sweep_staging_removes_leftovers_only() {
    let (dir, backend) = backend().await;
    store_file(&backend, "reports/keep.pdf", b"keep").await;
    std::fs::write(dir.path().join("reports/.lost.pdf.tmp.abc"), b"junk").unwrap();
    std::fs::write(dir.path().join("reports/.old.pdf.tmp.def"), b"junk").unwrap();

    assert_eq!(backend.sweep_staging().await.unwrap(), 2);
    assert!(staging_files(dir.path()).is_empty());
    assert_eq!(read_file(&backend, "reports/keep.pdf").await, b"keep");
}
