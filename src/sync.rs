//! Per-tenant sync orchestration with tenant-level failure isolation.
//!
//! Each tenant runs the same linear pipeline: fetch all rows, shape and
//! normalize them, write the snapshot, invoke the downstream procedure,
//! delete the snapshot. A failure anywhere in one tenant's pipeline is
//! logged and the run moves on to the next tenant.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::db::SnapshotConsumer;
use crate::error::SyncError;
use crate::k3::query::BillQueryClient;
use crate::snapshot::SnapshotWriter;
use crate::transform::normalize::DecimalFormats;
use crate::transform::shape::shape_rows;

// ─────────────────────────────────────────────────────────────────────────────
// Run Reporting
// ─────────────────────────────────────────────────────────────────────────────

/// Result of one tenant's completed pipeline.
#[derive(Debug)]
pub struct OrgOutcome {
    pub org_id: String,
    /// Records written to the snapshot.
    pub records: usize,
    /// Path of the snapshot if it still exists after the pipeline
    /// (dry run, or cleanup could not delete it).
    pub snapshot: Option<PathBuf>,
}

/// Aggregate outcome of one run across all tenants.
///
/// A run that reaches the end is a success regardless of how many
/// individual tenants failed; the failures are listed for reporting.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<OrgOutcome>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SyncRunner
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the full pipeline across the declared tenant list.
pub struct SyncRunner<C> {
    query: BillQueryClient,
    formats: DecimalFormats,
    writer: SnapshotWriter,
    consumer: C,
    dry_run: bool,
}

impl<C: SnapshotConsumer> SyncRunner<C> {
    pub fn new(
        query: BillQueryClient,
        formats: DecimalFormats,
        writer: SnapshotWriter,
        consumer: C,
        dry_run: bool,
    ) -> Self {
        Self {
            query,
            formats,
            writer,
            consumer,
            dry_run,
        }
    }

    /// Processes every tenant in declaration order, one at a time.
    ///
    /// The loop itself never fails: a tenant error is logged with its id
    /// and the next tenant proceeds with fresh state.
    pub async fn run(&self, org_ids: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();

        for org_id in org_ids {
            match self.sync_org(org_id).await {
                Ok(outcome) => {
                    summary.succeeded.push(outcome);
                }
                Err(err) => {
                    error!("[SYNC] org={} failed: {}", org_id, err);
                    summary.failed.push(org_id.clone());
                }
            }
        }

        info!(
            "[SYNC] run complete: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }

    /// One tenant's pipeline, end to end.
    async fn sync_org(&self, org_id: &str) -> Result<OrgOutcome, SyncError> {
        let rows = self.query.fetch_all(org_id).await?;

        let mut records = shape_rows(rows, &self.query.spec().field_keys);
        for record in &mut records {
            self.formats.normalize_record(record);
        }

        let snapshot = self.writer.write(org_id, &records)?;

        if self.dry_run {
            info!(
                "[SYNC] org={} dry run: keeping {} and skipping downstream call",
                org_id,
                snapshot.display()
            );
            return Ok(OrgOutcome {
                org_id: org_id.to_string(),
                records: records.len(),
                snapshot: Some(snapshot),
            });
        }

        self.consumer.consume(&snapshot, org_id).await?;

        // The snapshot was consumed; a leftover file is only worth a warning.
        let snapshot = match std::fs::remove_file(&snapshot) {
            Ok(()) => {
                info!("[CLEANUP] org={} deleted {}", org_id, snapshot.display());
                None
            }
            Err(err) => {
                warn!(
                    "[CLEANUP] org={} could not delete {}: {}",
                    org_id,
                    snapshot.display(),
                    err
                );
                Some(snapshot)
            }
        };

        Ok(OrgOutcome {
            org_id: org_id.to_string(),
            records: records.len(),
            snapshot,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
