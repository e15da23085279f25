use bytes::Bytes;
use futures::StreamExt;
use residency_storage::ObjectStore;
use std::path::{Path, PathBuf};

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Publish `data` under `key` through a single-chunk streaming upload.
#[allow(dead_code)]
pub async fn store_file(store: &dyn ObjectStore, key: &str, data: &'static [u8]) {
    let mut upload = store.put_stream(key).await.unwrap();
    upload.write(Bytes::from_static(data)).await.unwrap();
    upload.finish().await.unwrap();
}

/// Read a stored file back through `get_stream`.
#[allow(dead_code)]
pub async fn read_file(store: &dyn ObjectStore, key: &str) -> Vec<u8> {
    let mut stream = store.get_stream(key).await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

/// All hidden staging files under `root`, found by walking the tree directly.
#[allow(dead_code)]
pub fn staging_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if entry.file_name().to_string_lossy().contains(".tmp.") {
                found.push(path);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
