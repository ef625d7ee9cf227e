//! Downstream stored-procedure invocation.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::SyncError;

/// Port for the downstream consumer of one tenant's snapshot.
#[async_trait]
pub trait SnapshotConsumer: Send + Sync {
    /// Hands the snapshot path and tenant id to the downstream side.
    async fn consume(&self, snapshot: &Path, org_id: &str) -> Result<(), SyncError>;
}

/// Invokes the configured stored procedure with the snapshot path and
/// tenant id as named parameters, inside one committed transaction.
///
/// A fresh connection is opened per call and released when the call
/// returns, so no database state outlives a tenant's pipeline step.
pub struct StoredProcConsumer {
    url: String,
    procedure: String,
    statement: String,
}

impl StoredProcConsumer {
    pub fn new(config: &DatabaseConfig) -> Self {
        let statement = format!(
            "CALL {}({} => $1, {} => $2)",
            config.procedure, config.path_param, config.org_param
        );
        Self {
            url: config.url.clone(),
            procedure: config.procedure.clone(),
            statement,
        }
    }
}

#[async_trait]
impl SnapshotConsumer for StoredProcConsumer {
    async fn consume(&self, snapshot: &Path, org_id: &str) -> Result<(), SyncError> {
        let mut conn = PgConnection::connect(&self.url)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to connect: {}", e)))?;

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| SyncError::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(&self.statement)
            .bind(snapshot.display().to_string())
            .bind(org_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                SyncError::Database(format!("Procedure {} failed: {}", self.procedure, e))
            })?;

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(format!("Failed to commit: {}", e)))?;

        info!(
            "[SQL] org={} executed {} with {}",
            org_id,
            self.procedure,
            snapshot.display()
        );
        Ok(())
    }
}
