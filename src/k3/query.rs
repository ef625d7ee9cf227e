//! Bill-query construction and pagination.
//!
//! This module builds the structured bill-query request for one tenant and
//! drives repeated bounded-size fetches until the result set is exhausted:
//!
//! - **Page size clamping** - non-positive sizes fall back to the default,
//!   oversized requests clamp to the service ceiling
//! - **Filter construction** - the tenant equality clause always comes
//!   first, AND-combined with any configured extra clauses
//! - **Automatic pagination** - fetches until a short, empty, or
//!   non-list page signals the end

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::QueryConfig;
use crate::error::SyncError;
use crate::k3::client::K3Client;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Hard ceiling the service enforces on a single page request.
pub const MAX_PAGE_SIZE: i64 = 10_000;

/// Page size used when the configured size is absent or non-positive.
pub const DEFAULT_PAGE_SIZE: i64 = 5_000;

/// Service operator code for an equality comparison.
const COMPARE_EQUAL: &str = "67";

/// Service logic code for AND-combining filter clauses.
const LOGIC_AND: i64 = 0;

/// Field every request filters on to scope rows to one organization.
const ORG_FILTER_FIELD: &str = "FUseOrgId";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// One parenthesis-delimited clause of the service filter tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterClause {
    #[serde(default)]
    pub left: String,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub compare: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub right: String,
    #[serde(default)]
    pub logic: i64,
}

impl FilterClause {
    /// Builds a parenthesized equality clause, AND-combined with its
    /// neighbors.
    pub fn equals(field_name: &str, value: &str) -> Self {
        Self {
            left: "(".to_string(),
            field_name: field_name.to_string(),
            compare: COMPARE_EQUAL.to_string(),
            value: value.to_string(),
            right: ")".to_string(),
            logic: LOGIC_AND,
        }
    }
}

/// The structured bill-query request, serialized PascalCase to match the
/// service contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BillQueryRequest {
    pub form_id: String,
    pub field_keys: String,
    pub filter_string: Vec<FilterClause>,
    pub order_string: String,
    pub top_row_count: i64,
    pub start_row: i64,
    pub limit: i64,
    pub sub_system_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// QuerySpec
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable per-run query parameters shared by every tenant.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub form_id: String,
    pub field_keys: Vec<String>,
    pub order_string: String,
    pub top_row_count: i64,
    pub start_row: i64,
    pub page_size: i64,
    pub sub_system_id: String,
    pub extra_filters: Vec<FilterClause>,
}

impl QuerySpec {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            form_id: config.form_id.clone(),
            field_keys: config.field_key_list(),
            order_string: config.order_string.clone(),
            top_row_count: config.top_row_count,
            start_row: config.start_row,
            page_size: config.page_size,
            sub_system_id: config.sub_system_id.clone(),
            extra_filters: parse_extra_filters(&config.extra_filters_json),
        }
    }

    /// Builds the request for one page of one tenant's rows.
    pub fn request_for(&self, org_id: &str, start_row: i64, limit: i64) -> BillQueryRequest {
        let mut filter_string = vec![FilterClause::equals(ORG_FILTER_FIELD, org_id)];
        filter_string.extend(self.extra_filters.iter().cloned());

        BillQueryRequest {
            form_id: self.form_id.clone(),
            field_keys: self.field_keys.join(","),
            filter_string,
            order_string: self.order_string.clone(),
            top_row_count: self.top_row_count,
            start_row,
            limit,
            sub_system_id: self.sub_system_id.clone(),
        }
    }
}

/// Clamps a requested page size into the window the service accepts.
pub fn clamp_page_size(requested: i64) -> i64 {
    if requested <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.min(MAX_PAGE_SIZE)
    }
}

/// Parses the optional extra-filter JSON from configuration.
///
/// A malformed value (invalid JSON, or JSON that is not a filter-clause
/// list) is treated as empty with a warning rather than failing the run.
pub fn parse_extra_filters(raw: &str) -> Vec<FilterClause> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<FilterClause>>(raw) {
        Ok(clauses) => clauses,
        Err(err) => {
            warn!(
                "[QUERY] extra_filters_json is not a valid filter list, ignoring: {}",
                err
            );
            Vec::new()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BillQueryClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for paginated bill-query execution.
///
/// Wraps a [`K3Client`] session with the run's [`QuerySpec`] and fetches
/// all rows for a tenant across as many pages as the result set needs.
#[derive(Clone)]
pub struct BillQueryClient {
    client: K3Client,
    spec: QuerySpec,
}

impl BillQueryClient {
    pub fn new(client: K3Client, spec: QuerySpec) -> Self {
        Self { client, spec }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Fetches every row for one tenant.
    ///
    /// Pages are requested sequentially starting at the configured start
    /// row. Termination:
    ///
    /// - an empty or absent response ends the loop
    /// - a list shorter than the page size is the last page
    /// - a single non-list value is a terminal shape, kept as one row
    ///
    /// A tenant with no matching rows yields an empty vector.
    pub async fn fetch_all(&self, org_id: &str) -> Result<Vec<Value>, SyncError> {
        let per_page = clamp_page_size(self.spec.page_size);
        let mut all_rows: Vec<Value> = Vec::new();
        let mut offset = self.spec.start_row;
        let mut page_count: u32 = 0;

        loop {
            let request = self.spec.request_for(org_id, offset, per_page);
            let data = self.client.execute_bill_query(&request).await?;
            page_count += 1;

            if is_empty_response(&data) {
                break;
            }

            match data {
                Value::Array(rows) => {
                    let batch = rows.len();
                    all_rows.extend(rows);
                    info!("[PAGE] org={} start_row={} +{} rows", org_id, offset, batch);
                    if (batch as i64) < per_page {
                        break;
                    }
                    offset += batch as i64;
                }
                other => {
                    // Terminal non-paginated shape: keep it as a single row.
                    info!(
                        "[PAGE] org={} start_row={} single value received, stopping",
                        org_id, offset
                    );
                    all_rows.push(other);
                    break;
                }
            }
        }

        info!(
            "[PAGE] org={} fetched {} rows in {} pages",
            org_id,
            all_rows.len(),
            page_count
        );
        Ok(all_rows)
    }
}

/// True for response shapes that signal "no rows": null, empty list,
/// empty string, or empty object.
fn is_empty_response(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(rows) => rows.is_empty(),
        Value::String(text) => text.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
