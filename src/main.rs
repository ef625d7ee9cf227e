use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use k3sync::config::load_config;
use k3sync::db::StoredProcConsumer;
use k3sync::k3::client::K3Client;
use k3sync::k3::query::{BillQueryClient, QuerySpec};
use k3sync::snapshot::SnapshotWriter;
use k3sync::sync::SyncRunner;
use k3sync::transform::normalize::DecimalFormats;

fn parse_config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    let mut config_path = default_config_path();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(value) = args.next() {
                config_path = PathBuf::from(value);
            }
        }
    }

    config_path
}

fn default_config_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home).join(".k3sync").join("config.toml");
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("config/k3sync.toml")
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = parse_config_path();
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let org_ids = config.sync.org_id_list();

    let client = K3Client::login(&config.k3)
        .await
        .context("failed to establish K3 session")?;
    let query = BillQueryClient::new(client, QuerySpec::from_config(&config.query));
    let formats = DecimalFormats::new(config.normalize.enabled, &config.normalize.places);
    let writer = SnapshotWriter::new(&config.snapshot);
    let consumer = StoredProcConsumer::new(&config.database);

    let runner = SyncRunner::new(query, formats, writer, consumer, config.sync.dry_run);
    let summary = runner.run(&org_ids).await;

    if !summary.all_ok() {
        tracing::warn!(
            "{} of {} orgs failed: {}",
            summary.failed.len(),
            org_ids.len(),
            summary.failed.join(", ")
        );
    }

    Ok(())
}
