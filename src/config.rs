use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::SyncError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct K3Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub acct_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default = "default_secret")]
    pub app_secret: SecretString,
    #[serde(default = "default_lcid")]
    pub lcid: u32,
}

impl Default for K3Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            acct_id: String::new(),
            username: String::new(),
            app_id: String::new(),
            app_secret: default_secret(),
            lcid: default_lcid(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    #[serde(default = "default_form_id")]
    pub form_id: String,
    #[serde(default = "default_field_keys")]
    pub field_keys: String,
    #[serde(default = "default_order_string")]
    pub order_string: String,
    #[serde(default)]
    pub top_row_count: i64,
    #[serde(default)]
    pub start_row: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub sub_system_id: String,
    #[serde(default)]
    pub extra_filters_json: String,
}

impl QueryConfig {
    pub fn field_key_list(&self) -> Vec<String> {
        split_csv(&self.field_keys)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            form_id: default_form_id(),
            field_keys: default_field_keys(),
            order_string: default_order_string(),
            top_row_count: 0,
            start_row: 0,
            page_size: default_page_size(),
            sub_system_id: String::new(),
            extra_filters_json: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub org_ids: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl RunConfig {
    pub fn org_id_list(&self) -> Vec<String> {
        split_csv(&self.org_ids)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub pretty: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            file_prefix: default_file_prefix(),
            pretty: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub places: BTreeMap<String, u32>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            places: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_procedure")]
    pub procedure: String,
    #[serde(default = "default_path_param")]
    pub path_param: String,
    #[serde(default = "default_org_param")]
    pub org_param: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            procedure: default_procedure(),
            path_param: default_path_param(),
            org_param: default_org_param(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub k3: K3Config,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub sync: RunConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig, SyncError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let config: SyncConfig = toml::from_str(&raw)
        .map_err(|e| SyncError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &SyncConfig) -> Result<(), SyncError> {
    if config.sync.org_id_list().is_empty() {
        return Err(SyncError::Config(
            "sync.org_ids must list at least one organization id".into(),
        ));
    }
    if config.query.field_key_list().is_empty() {
        return Err(SyncError::Config(
            "query.field_keys must list at least one field".into(),
        ));
    }
    Ok(())
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_server_url() -> String {
    "http://127.0.0.1:8090/K3Cloud/".to_string()
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_lcid() -> u32 {
    2052
}

fn default_form_id() -> String {
    "BD_MATERIAL".to_string()
}

fn default_field_keys() -> String {
    "FMATERIALID,FNUMBER,FNAME,F_BOX_VOLUME,F_price_effect_num,F_TQOY_Price_9s2".to_string()
}

fn default_order_string() -> String {
    "FNUMBER ASC".to_string()
}

fn default_page_size() -> i64 {
    5_000
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("k3_dumps")
}

fn default_file_prefix() -> String {
    "k3_bd_material".to_string()
}

fn default_true() -> bool {
    true
}

fn default_procedure() -> String {
    "update_products_from_snapshot".to_string()
}

fn default_path_param() -> String {
    "snapshot_path".to_string()
}

fn default_org_param() -> String {
    "org_id".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let raw = r#"
            [k3]
            server_url = "http://k3.example.com/K3Cloud/"
            acct_id = "abc123"
            username = "integration"
            app_id = "app"
            app_secret = "s3cret"

            [query]
            form_id = "BD_MATERIAL"
            field_keys = "FMATERIALID,FNUMBER"
            page_size = 2000

            [sync]
            org_ids = "1148519,2000001"
            dry_run = true

            [snapshot]
            out_dir = "/tmp/dumps"
            pretty = true

            [normalize]
            enabled = false

            [normalize.places]
            F_BOX_VOLUME = 4

            [database]
            url = "postgres://localhost/materials"
            procedure = "load_materials"
        "#;

        let config: SyncConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.k3.acct_id, "abc123");
        assert_eq!(config.query.page_size, 2000);
        assert_eq!(
            config.sync.org_id_list(),
            vec!["1148519".to_string(), "2000001".to_string()]
        );
        assert!(config.sync.dry_run);
        assert_eq!(config.snapshot.out_dir, PathBuf::from("/tmp/dumps"));
        assert!(config.snapshot.pretty);
        assert!(!config.normalize.enabled);
        assert_eq!(config.normalize.places.get("F_BOX_VOLUME"), Some(&4));
        assert_eq!(config.database.procedure, "load_materials");
    }

    #[test]
    fn empty_sections_fall_back_to_defaults() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert_eq!(config.k3.lcid, 2052);
        assert_eq!(config.query.page_size, 5_000);
        assert_eq!(config.query.form_id, "BD_MATERIAL");
        assert_eq!(config.snapshot.file_prefix, "k3_bd_material");
        assert!(config.normalize.enabled);
        assert!(!config.sync.dry_run);
        assert_eq!(config.database.path_param, "snapshot_path");
        assert_eq!(config.database.org_param, "org_id");
    }

    #[test]
    fn org_id_list_trims_and_drops_empties() {
        let run = RunConfig {
            org_ids: " 100 ,, 200 ,".to_string(),
            dry_run: false,
        };
        assert_eq!(run.org_id_list(), vec!["100".to_string(), "200".to_string()]);
    }

    #[test]
    fn field_key_list_preserves_declaration_order() {
        let query = QueryConfig {
            field_keys: "FNUMBER, FNAME ,F_BOX_VOLUME".to_string(),
            ..QueryConfig::default()
        };
        assert_eq!(
            query.field_key_list(),
            vec![
                "FNUMBER".to_string(),
                "FNAME".to_string(),
                "F_BOX_VOLUME".to_string()
            ]
        );
    }

    #[test]
    fn validate_rejects_missing_org_ids() {
        let config = SyncConfig::default();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("org_ids"));
    }

    #[test]
    fn validate_accepts_single_org_id() {
        let mut config = SyncConfig::default();
        config.sync.org_ids = "1148519".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let raw = r#"
            [sync]
            org_ids = "1"
            retries = 3
        "#;
        assert!(toml::from_str::<SyncConfig>(raw).is_err());
    }
}
