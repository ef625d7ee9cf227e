use thiserror::Error;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── K3 service ────────────────────────────────────────────────────────────
    #[error("K3 login failed: {0}")]
    LoginFailed(String),

    #[error("K3 service error: {0}")]
    ServiceError(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Snapshot files ────────────────────────────────────────────────────────
    #[error("Snapshot write failed: {0}")]
    SnapshotWrite(String),

    // ── Database ──────────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}
