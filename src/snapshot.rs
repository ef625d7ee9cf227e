//! Atomic JSON snapshot writer.
//!
//! Writes one tenant's records to a temporary file in the destination
//! directory, then atomically persists it under its final name. A snapshot
//! is therefore never observable in a partially written state.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::SnapshotConfig;
use crate::error::SyncError;

/// Writes per-tenant snapshot files under `{out_dir}/org_{id}/`.
///
/// Filenames embed the tenant id and a second-resolution timestamp:
/// `{prefix}_{org}_{YYYYmmdd_HHMMSS}.json`.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    out_dir: PathBuf,
    file_prefix: String,
    pretty: bool,
}

impl SnapshotWriter {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            out_dir: config.out_dir.clone(),
            file_prefix: config.file_prefix.clone(),
            pretty: config.pretty,
        }
    }

    /// Serializes the records as a JSON array and returns the final path.
    pub fn write(
        &self,
        org_id: &str,
        records: &[Map<String, Value>],
    ) -> Result<PathBuf, SyncError> {
        let dir = self.out_dir.join(format!("org_{}", org_id));
        std::fs::create_dir_all(&dir).map_err(|e| {
            SyncError::SnapshotWrite(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let final_path = dir.join(format!("{}_{}_{}.json", self.file_prefix, org_id, timestamp));

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| {
            SyncError::SnapshotWrite(format!("Failed to create temporary file: {}", e))
        })?;

        let serialized = if self.pretty {
            serde_json::to_writer_pretty(&mut temp, records)
        } else {
            serde_json::to_writer(&mut temp, records)
        };
        serialized.map_err(|e| {
            SyncError::SnapshotWrite(format!("Failed to serialize records: {}", e))
        })?;
        temp.flush()
            .map_err(|e| SyncError::SnapshotWrite(format!("Failed to flush: {}", e)))?;

        temp.persist(&final_path).map_err(|e| {
            SyncError::SnapshotWrite(format!(
                "Failed to persist {}: {}",
                final_path.display(),
                e.error
            ))
        })?;

        info!(
            "[SNAPSHOT] org={} wrote {} records to {}",
            org_id,
            records.len(),
            final_path.display()
        );
        Ok(final_path)
    }
}

/// Returns the snapshot files currently present for one tenant.
pub fn snapshot_files(out_dir: &Path, org_id: &str) -> Vec<PathBuf> {
    let dir = out_dir.join(format!("org_{}", org_id));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}
