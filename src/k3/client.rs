//! K3 Cloud HTTP client with session login and safe logging.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use crate::config::K3Config;
use crate::error::SyncError;
use crate::k3::query::BillQueryRequest;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all K3 Cloud API requests.
const CLIENT_USER_AGENT: &str = "k3sync/0.1.0";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Service endpoint for app-secret session login.
const LOGIN_ENDPOINT: &str =
    "Kingdee.BOS.WebApi.ServicesStub.AuthService.LoginByAppSecret.common.kdsvc";

/// Service endpoint for bill-query execution.
const BILL_QUERY_ENDPOINT: &str =
    "Kingdee.BOS.WebApi.ServicesStub.DynamicFormService.ExecuteBillQuery.common.kdsvc";

/// Login result code the service returns for a successful session.
const LOGIN_OK: i32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// PayloadEncoding
// ─────────────────────────────────────────────────────────────────────────────

/// How the bill-query parameter is encoded on the wire.
///
/// The service accepts the request either as a structured JSON object or as
/// that object serialized into a JSON string. Deployments differ in which
/// form they accept, so both are candidate invocation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Parameter sent as a JSON object.
    Structured,
    /// Parameter sent as a JSON-serialized string.
    Serialized,
}

/// Candidate encodings, tried in order until one succeeds.
const PAYLOAD_ENCODINGS: &[PayloadEncoding] =
    &[PayloadEncoding::Structured, PayloadEncoding::Serialized];

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Mirrors the `LoginByAppSecret` response JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireLoginResponse {
    #[serde(default)]
    login_result_type: i32,
    #[serde(default)]
    message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// K3Client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for the K3 Cloud Web API.
///
/// Holds the session established by [`K3Client::login`]; the session cookie
/// is carried automatically on subsequent requests via the cookie store.
///
/// # Security
///
/// The app secret is read once during login and never logged. Request
/// logging includes only the service name, status code, and duration.
#[derive(Clone, Debug)]
pub struct K3Client {
    /// The underlying HTTP client (owns the session cookie store).
    http: reqwest::Client,
    /// Normalized server base URL, always ending in `/`.
    base_url: Url,
}

impl K3Client {
    /// Establishes an authenticated session against the configured server.
    ///
    /// # Errors
    ///
    /// - `SyncError::Config` - the server URL cannot be parsed
    /// - `SyncError::ConnectionFailed` - the login request cannot be sent
    /// - `SyncError::LoginFailed` - the service rejected the credentials
    pub async fn login(config: &K3Config) -> Result<Self, SyncError> {
        let base_url = parse_server_url(&config.server_url)?;
        let http = build_http_client()?;
        let client = Self { http, base_url };
        client.login_by_app_secret(config).await?;
        Ok(client)
    }

    /// Executes one bill-query request, trying each payload encoding in
    /// order. The failure of the final candidate is the one propagated.
    ///
    /// A response delivered as a JSON string is decoded once; inner text
    /// that is not valid JSON is kept as-is.
    pub async fn execute_bill_query(&self, request: &BillQueryRequest) -> Result<Value, SyncError> {
        let mut last_err: Option<SyncError> = None;

        for (attempt, encoding) in PAYLOAD_ENCODINGS.iter().enumerate() {
            match self.try_bill_query(request, *encoding).await {
                Ok(value) => return Ok(decode_response(value)),
                Err(err) => {
                    if attempt + 1 < PAYLOAD_ENCODINGS.len() {
                        warn!(
                            "[K3] ExecuteBillQuery rejected {:?} encoding, retrying: {}",
                            encoding, err
                        );
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| SyncError::Internal("no payload encoding attempted".to_string())))
    }

    /// Performs the `LoginByAppSecret` handshake.
    async fn login_by_app_secret(&self, config: &K3Config) -> Result<(), SyncError> {
        let url = self.endpoint_url(LOGIN_ENDPOINT)?;
        let body = json!({
            "parameters": [
                config.acct_id,
                config.username,
                config.app_id,
                config.app_secret.expose_secret(),
                config.lcid,
            ]
        });

        let start = Instant::now();
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::ConnectionFailed(format!("Login request failed: {}", e)))?;

        let status = response.status();
        info!(
            "[K3] POST AuthService.LoginByAppSecret {} {}ms",
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(SyncError::LoginFailed(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        let login: WireLoginResponse = response
            .json()
            .await
            .map_err(|e| SyncError::LoginFailed(format!("Unreadable login response: {}", e)))?;

        if login.login_result_type != LOGIN_OK {
            return Err(SyncError::LoginFailed(
                login
                    .message
                    .unwrap_or_else(|| "login rejected by service".to_string()),
            ));
        }

        Ok(())
    }

    /// Executes a single bill-query invocation with one encoding.
    async fn try_bill_query(
        &self,
        request: &BillQueryRequest,
        encoding: PayloadEncoding,
    ) -> Result<Value, SyncError> {
        let url = self.endpoint_url(BILL_QUERY_ENDPOINT)?;

        let para = match encoding {
            PayloadEncoding::Structured => serde_json::to_value(request)
                .map_err(|e| SyncError::Internal(format!("Failed to encode request: {}", e)))?,
            PayloadEncoding::Serialized => {
                let text = serde_json::to_string(request)
                    .map_err(|e| SyncError::Internal(format!("Failed to encode request: {}", e)))?;
                Value::String(text)
            }
        };
        let body = json!({ "parameters": [para] });

        let start = Instant::now();
        let response = self.http.post(url).json(&body).send().await.map_err(|e| {
            SyncError::ConnectionFailed(format!("ExecuteBillQuery request failed: {}", e))
        })?;

        let status = response.status();
        info!(
            "[K3] POST DynamicFormService.ExecuteBillQuery {} {}ms",
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(SyncError::ServiceError(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            SyncError::ServiceError(format!("Failed to parse bill query response: {}", e))
        })
    }

    /// Joins a service endpoint onto the base URL.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(endpoint)
            .map_err(|_| SyncError::Internal(format!("Invalid endpoint: {}", endpoint)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Parses and normalizes the configured server URL.
///
/// Collapses an accidental doubled `//K3Cloud/` path segment and guarantees
/// a trailing slash so endpoint joins append rather than replace.
fn parse_server_url(raw: &str) -> Result<Url, SyncError> {
    let mut normalized = match raw.split_once("://") {
        Some((scheme, rest)) => {
            format!("{}://{}", scheme, rest.replace("//K3Cloud/", "/K3Cloud/"))
        }
        None => raw.to_string(),
    };
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    Url::parse(&normalized)
        .map_err(|e| SyncError::Config(format!("Invalid K3 server URL {:?}: {}", raw, e)))
}

/// Unwraps a string-wrapped service response into its inner JSON value.
fn decode_response(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Builds the configured HTTP client with a session cookie store.
fn build_http_client() -> Result<reqwest::Client, SyncError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| SyncError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k3::query::{QuerySpec, DEFAULT_PAGE_SIZE};
    use secrecy::SecretString;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_url: &str) -> K3Config {
        K3Config {
            server_url: server_url.to_string(),
            acct_id: "acct".to_string(),
            username: "user".to_string(),
            app_id: "app".to_string(),
            app_secret: SecretString::from("shhh".to_string()),
            lcid: 2052,
        }
    }

    fn test_request() -> BillQueryRequest {
        let spec = QuerySpec {
            form_id: "BD_MATERIAL".to_string(),
            field_keys: vec!["FNUMBER".to_string()],
            order_string: "FNUMBER ASC".to_string(),
            top_row_count: 0,
            start_row: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sub_system_id: String::new(),
            extra_filters: Vec::new(),
        };
        spec.request_for("1148519", 0, DEFAULT_PAGE_SIZE)
    }

    async fn mount_login_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("/{}", LOGIN_ENDPOINT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "LoginResultType": 1,
                "Message": null
            })))
            .mount(server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Server URL Normalization Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn server_url_gains_trailing_slash() {
        let url = parse_server_url("http://k3.example.com/K3Cloud").unwrap();
        assert_eq!(url.as_str(), "http://k3.example.com/K3Cloud/");
    }

    #[test]
    fn server_url_collapses_doubled_path() {
        let url = parse_server_url("http://k3.example.com//K3Cloud/").unwrap();
        assert_eq!(url.as_str(), "http://k3.example.com/K3Cloud/");
    }

    #[test]
    fn server_url_rejects_garbage() {
        let result = parse_server_url("not a url");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn endpoint_join_appends_to_base() {
        let base = parse_server_url("http://k3.example.com/K3Cloud/").unwrap();
        let client = K3Client {
            http: build_http_client().unwrap(),
            base_url: base,
        };
        let url = client.endpoint_url(BILL_QUERY_ENDPOINT).unwrap();
        assert_eq!(
            url.as_str(),
            format!("http://k3.example.com/K3Cloud/{}", BILL_QUERY_ENDPOINT)
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn login_succeeds_on_result_type_one() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;

        let result = K3Client::login(&test_config(&server.uri())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn login_sends_credentials_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{}", LOGIN_ENDPOINT)))
            .and(body_string_contains(
                r#""parameters":["acct","user","app","shhh",2052]"#,
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "LoginResultType": 1 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = K3Client::login(&test_config(&server.uri())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn login_rejection_carries_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{}", LOGIN_ENDPOINT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "LoginResultType": 0,
                "Message": "invalid app secret"
            })))
            .mount(&server)
            .await;

        let err = K3Client::login(&test_config(&server.uri()))
            .await
            .unwrap_err();
        match err {
            SyncError::LoginFailed(msg) => assert!(msg.contains("invalid app secret")),
            other => panic!("Expected LoginFailed, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn login_http_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{}", LOGIN_ENDPOINT)))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = K3Client::login(&test_config(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::LoginFailed(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encoding Fallback Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn structured_encoding_is_tried_first() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("/{}", BILL_QUERY_ENDPOINT)))
            .and(body_string_contains(r#""parameters":[{"FormId""#))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([["1", "M001"]])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = K3Client::login(&test_config(&server.uri())).await.unwrap();
        let data = client.execute_bill_query(&test_request()).await.unwrap();
        assert_eq!(data, serde_json::json!([["1", "M001"]]));
    }

    #[tokio::test]
    async fn falls_back_to_serialized_encoding() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;

        // A structured parameter starts with an object, a serialized one
        // with a string; the two matchers below are disjoint.
        Mock::given(method("POST"))
            .and(path(format!("/{}", BILL_QUERY_ENDPOINT)))
            .and(body_string_contains(r#""parameters":[{"FormId""#))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/{}", BILL_QUERY_ENDPOINT)))
            .and(body_string_contains(r#""parameters":["{"#))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([["1", "M001"]])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = K3Client::login(&test_config(&server.uri())).await.unwrap();
        let data = client.execute_bill_query(&test_request()).await.unwrap();
        assert_eq!(data, serde_json::json!([["1", "M001"]]));
    }

    #[tokio::test]
    async fn failure_of_both_encodings_propagates() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("/{}", BILL_QUERY_ENDPOINT)))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = K3Client::login(&test_config(&server.uri())).await.unwrap();
        let err = client.execute_bill_query(&test_request()).await.unwrap_err();
        assert!(matches!(err, SyncError::ServiceError(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Response Decoding Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn decode_unwraps_string_wrapped_json() {
        let decoded = decode_response(Value::String(r#"[["1","M001"]]"#.to_string()));
        assert_eq!(decoded, serde_json::json!([["1", "M001"]]));
    }

    #[test]
    fn decode_keeps_unparseable_string() {
        let decoded = decode_response(Value::String("not json".to_string()));
        assert_eq!(decoded, Value::String("not json".to_string()));
    }

    #[test]
    fn decode_passes_arrays_through() {
        let value = serde_json::json!([[1, 2]]);
        assert_eq!(decode_response(value.clone()), value);
    }

    #[tokio::test]
    async fn string_wrapped_response_is_decoded() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("/{}", BILL_QUERY_ENDPOINT)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!(r#"[["1","M001"]]"#)),
            )
            .mount(&server)
            .await;

        let client = K3Client::login(&test_config(&server.uri())).await.unwrap();
        let data = client.execute_bill_query(&test_request()).await.unwrap();
        assert_eq!(data, serde_json::json!([["1", "M001"]]));
    }
}
