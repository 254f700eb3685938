use std::path::Path;

use api::response::ManifestStatus;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::key::{self, KeyMode};

/// Lists stream directories under `media_root` and whether each has a playlist.
/// Directories whose name is not a valid stream key are skipped.
pub async fn probe(media_root: &Path, mode: KeyMode) -> Vec<ManifestStatus> {
    let mut dir = match tokio::fs::read_dir(media_root).await {
        Ok(dir) => dir,
        Err(e) => {
            debug!(root = %media_root.display(), "media root unreadable: {}", e);
            return vec![];
        }
    };

    let mut streams = vec![];
    while let Ok(Some(entry)) = dir.next_entry().await {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !key::validate(&name, mode) {
            continue;
        }
        let last_modified = tokio::fs::metadata(entry.path().join(api::path::MANIFEST))
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.modified().ok().map(DateTime::<Utc>::from));
        streams.push(ManifestStatus {
            stream_key: name,
            manifest: last_modified.is_some(),
            last_modified: last_modified.flatten(),
        });
    }
    streams.sort_by(|a, b| a.stream_key.cmp(&b.stream_key));
    streams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("smc_validkey123")).unwrap();
        std::fs::write(root.join("smc_validkey123").join("index.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::create_dir_all(root.join("smc_pending01")).unwrap();
        std::fs::create_dir_all(root.join("not valid")).unwrap();
        std::fs::write(root.join("smc_afile0001"), "").unwrap();

        let streams = probe(root, KeyMode::Strict).await;
        assert_eq!(2, streams.len());
        assert_eq!("smc_pending01", streams[0].stream_key);
        assert!(!streams[0].manifest);
        assert!(streams[0].last_modified.is_none());
        assert_eq!("smc_validkey123", streams[1].stream_key);
        assert!(streams[1].manifest);
        assert!(streams[1].last_modified.is_some());
    }

    #[tokio::test]
    async fn test_probe_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe(&dir.path().join("missing"), KeyMode::Strict)
            .await
            .is_empty());
    }
}
