use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::models::FeedItem;
use crate::traits::SnapshotSink;

/// Writes the snapshot as a pretty-printed JSON array.
///
/// The file is written to a temporary sibling and renamed over the target,
/// so readers see either the previous snapshot or the complete new one.
#[derive(Debug, Clone)]
pub struct FileSnapshotWriter {
    path: PathBuf,
}

impl FileSnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSink for FileSnapshotWriter {
    async fn install(&self, items: &[FeedItem]) -> Result<(), AppError> {
        let mut json = serde_json::to_vec_pretty(items)?;
        json.push(b'\n');
        let path = self.path.clone();

        // fsync and rename block, keep them off the runtime threads.
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| AppError::SnapshotError(format!("Snapshot task failed: {e}")))??;

        tracing::info!(path = %self.path.display(), items = items.len(), "Snapshot written");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| AppError::SnapshotError(format!("Cannot create {}: {e}", dir.display())))?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        AppError::SnapshotError(format!(
            "Cannot install snapshot at {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}
