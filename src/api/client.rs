use std::time::{Duration, Instant};

use anyhow::Result;
use log::debug;
use thiserror::Error;

use super::types::{CallHistoryPage, ConnectionReport, SyncWindow};
use crate::config::Connection;

const CALL_HISTORY_PATH: &str = "api/v1/call-history";
const PAGE_TIMEOUT_SECS: u64 = 30;
const TEST_TIMEOUT_SECS: u64 = 20;
const RECORDING_TIMEOUT_SECS: u64 = 60;
const ERROR_BODY_LIMIT: usize = 300;
const PREVIEW_LIMIT: usize = 200;

/// Safely slice a string at UTF-8 character boundaries.
/// Returns a substring from `start` to `end` byte positions, adjusted to valid char boundaries.
fn safe_slice(s: &str, start: usize, end: usize) -> &str {
    let start = s.floor_char_boundary(start);
    let end = s.ceil_char_boundary(end.min(s.len()));
    &s[start..end]
}

/// Truncate a string, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", safe_slice(s, 0, max_len))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Vendor API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Anything that can serve pages of vendor call history.
pub trait CallHistorySource {
    fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        window: &SyncWindow,
    ) -> Result<CallHistoryPage, ApiError>;
}

/// Query string for one call-history page. Unused filters are sent empty,
/// the way the vendor's own UI does.
pub fn history_query(page: u32, per_page: u32, window: Option<&SyncWindow>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("per_page", per_page.to_string()),
        ("page", page.to_string()),
        ("sort", "-date_time".to_string()),
    ];
    if let Some(window) = window {
        query.extend([
            ("filter[from]", window.from_param()),
            ("filter[to]", window.to_param()),
            ("filter[type]", String::new()),
            ("filter[status]", String::new()),
            ("filter[src]", String::new()),
            ("filter[dst]", String::new()),
            ("filter[external_number]", String::new()),
        ]);
    }
    query
}

pub struct VendorClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl VendorClient {
    pub fn new(connection: &Connection) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(PAGE_TIMEOUT_SECS))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            token: connection.token.clone(),
            client,
        })
    }

    fn history_url(&self) -> String {
        format!("{}/{}", self.base_url, CALL_HISTORY_PATH)
    }

    fn get_history(
        &self,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<reqwest::blocking::Response, ApiError> {
        let url = self.history_url();
        debug!("GET {} {:?}", url, query);

        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.token)
            .header("Accept", "application/json")
            .query(query)
            .timeout(timeout)
            .send()
            .map_err(|e| {
                debug!("  network error after {:?}: {}", start.elapsed(), e);
                ApiError::Network(e.to_string())
            })?;

        debug!("  response: {} in {:?}", response.status(), start.elapsed());
        Ok(response)
    }

    /// Check the vendor with a one-record request. Non-200 statuses are
    /// reported, not raised; only transport failures are errors.
    pub fn test_connection(&self) -> Result<ConnectionReport, ApiError> {
        let query = history_query(1, 1, None);
        let response = self.get_history(&query, Duration::from_secs(TEST_TIMEOUT_SECS))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ApiError::InvalidResponse(format!("failed to read body: {}", e)))?;

        let mut report = ConnectionReport {
            status,
            items: None,
            current_page: None,
            last_page: None,
            preview: None,
        };
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(map)) => {
                report.items = Some(map.get("data").and_then(|d| d.as_array()).map_or(0, Vec::len));
                if let Some(meta) = map.get("meta").and_then(|m| m.as_object()) {
                    report.current_page = meta.get("current_page").and_then(|v| v.as_u64());
                    report.last_page = meta.get("last_page").and_then(|v| v.as_u64());
                }
            }
            Ok(_) => {}
            Err(_) => report.preview = Some(truncate(&body, PREVIEW_LIMIT)),
        }
        Ok(report)
    }
}

impl CallHistorySource for VendorClient {
    fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        window: &SyncWindow,
    ) -> Result<CallHistoryPage, ApiError> {
        let query = history_query(page, per_page, Some(window));
        let response = self.get_history(&query, Duration::from_secs(PAGE_TIMEOUT_SECS))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::InvalidResponse(format!("failed to read body: {}", e)))?;

        if status.as_u16() != 200 {
            debug!("  vendor error ({}): {}", status.as_u16(), truncate(&body, 500));
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        debug!("  response body: {} bytes", body.len());
        serde_json::from_str(&body).map_err(|e| {
            debug!("  deserialization error: {}", e);
            ApiError::InvalidResponse(format!(
                "Failed to parse call history: {}\n\nResponse body:\n{}",
                e,
                truncate(&body, 500)
            ))
        })
    }
}

/// A recording downloaded through the proxy.
#[derive(Debug)]
pub struct Recording {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fetch a recording fully into memory.
pub fn fetch_recording(url: &str) -> Result<Recording, ApiError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(RECORDING_TIMEOUT_SECS))
        .build()
        .map_err(|e| ApiError::Network(e.to_string()))?;

    debug!("GET {} (recording)", url);
    let response = client
        .get(url)
        .send()
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: truncate(&body, ERROR_BODY_LIMIT),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/mpeg")
        .to_string();
    let bytes = response
        .bytes()
        .map_err(|e| ApiError::Network(format!("failed to read recording: {}", e)))?;
    debug!("  recording: {} bytes ({})", bytes.len(), content_type);

    Ok(Recording {
        content_type,
        bytes: bytes.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{HeaderMap, StatusCode};
    use axum::extract::Query;
    use axum::routing::get;
    use axum::Router;
    use chrono::{TimeZone, Utc};

    use crate::api::test_server;
    use crate::config::BusinessTz;

    /// Authorization header and query string of each request the vendor saw.
    type Seen = Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>;

    /// A vendor whose call-history endpoint always answers `status` with `body`.
    fn fake_vendor(status: StatusCode, content_type: &'static str, body: String) -> (VendorClient, Seen) {
        let seen: Seen = Arc::default();
        let log = seen.clone();
        let router = Router::new().route(
            "/api/v1/call-history",
            get(move |headers: HeaderMap, Query(query): Query<HashMap<String, String>>| {
                let log = log.clone();
                let body = body.clone();
                async move {
                    let auth = headers
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    log.lock().unwrap().push((auth, query));
                    (status, [(CONTENT_TYPE, content_type)], body)
                }
            }),
        );
        let addr = test_server::spawn(router);
        let client = VendorClient::new(&Connection {
            base_url: format!("http://{}/", addr),
            token: "Token abc 123".to_string(),
            per_page: 50,
        })
        .unwrap();
        (client, seen)
    }

    fn window() -> SyncWindow {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 7, 0, 0).unwrap();
        SyncWindow::lookback(now, 1, BusinessTz::parse("+05:00").unwrap()).unwrap()
    }

    #[test]
    fn test_fetch_page_sends_token_and_window() {
        let body = r#"{"data":[{"id":1},{"id":2}],"meta":{"current_page":2,"last_page":3}}"#;
        let (client, seen) = fake_vendor(StatusCode::OK, "application/json", body.to_string());

        let page = client.fetch_page(2, 50, &window()).unwrap();
        assert_eq!(page.data.len(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (auth, query) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Token abc 123"));
        assert_eq!(query["page"], "2");
        assert_eq!(query["per_page"], "50");
        assert_eq!(query["sort"], "-date_time");
        assert_eq!(query["filter[from]"], "2025-06-09 12:00:00");
        assert_eq!(query["filter[to]"], "2025-06-10 12:00:00");
        assert_eq!(query["filter[status]"], "");
    }

    #[test]
    fn test_fetch_page_error_status_truncates_body() {
        let (client, _) = fake_vendor(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "x".repeat(1000));

        match client.fetch_page(1, 50, &window()) {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), ERROR_BODY_LIMIT + 3);
                assert!(body.ends_with("..."));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_page_rejects_non_json() {
        let (client, _) = fake_vendor(StatusCode::OK, "text/html", "<html>maintenance</html>".to_string());

        let err = client.fetch_page(1, 50, &window()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
        assert!(err.to_string().contains("<html>maintenance</html>"));
    }

    #[test]
    fn test_connection_reports_counts() {
        let body = r#"{"data":[{"id":1}],"meta":{"current_page":1,"last_page":40}}"#;
        let (client, seen) = fake_vendor(StatusCode::OK, "application/json", body.to_string());

        let report = client.test_connection().unwrap();
        assert!(report.is_ok());
        assert_eq!(report.items, Some(1));
        assert_eq!(report.current_page, Some(1));
        assert_eq!(report.last_page, Some(40));
        assert_eq!(report.preview, None);

        let seen = seen.lock().unwrap();
        let (_, query) = &seen[0];
        assert_eq!(query["per_page"], "1");
        assert_eq!(query["page"], "1");
        assert!(!query.contains_key("filter[from]"));
    }

    #[test]
    fn test_connection_reports_status_and_preview() {
        let (client, _) = fake_vendor(StatusCode::UNAUTHORIZED, "text/plain", "bad token".to_string());

        let report = client.test_connection().unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.status, 401);
        assert_eq!(report.items, None);
        assert_eq!(report.preview.as_deref(), Some("bad token"));
    }

    #[test]
    fn test_fetch_recording() {
        let router = Router::new()
            .route(
                "/rec/7.wav",
                get(|| async { ([(CONTENT_TYPE, "audio/wav")], b"RIFFdata".to_vec()) }),
            )
            .route("/rec/8.wav", get(|| async { (StatusCode::NOT_FOUND, "gone") }));
        let addr = test_server::spawn(router);

        let recording = fetch_recording(&format!("http://{}/rec/7.wav", addr)).unwrap();
        assert_eq!(recording.content_type, "audio/wav");
        assert_eq!(recording.bytes, b"RIFFdata");

        let err = fetch_recording(&format!("http://{}/rec/8.wav", addr)).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "Vendor API error 403: forbidden");

        let err = ApiError::Network("timed out".to_string());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_history_query_with_window() {
        let tz = BusinessTz::parse("+05:00").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 7, 0, 0).unwrap();
        let window = SyncWindow::lookback(now, 1, tz).unwrap();

        let query = history_query(2, 50, Some(&window));
        let get = |k: &str| query.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("per_page"), Some("50"));
        assert_eq!(get("page"), Some("2"));
        assert_eq!(get("sort"), Some("-date_time"));
        assert_eq!(get("filter[from]"), Some("2025-06-09 12:00:00"));
        assert_eq!(get("filter[to]"), Some("2025-06-10 12:00:00"));
        assert_eq!(get("filter[external_number]"), Some(""));
    }

    #[test]
    fn test_history_query_without_window() {
        let query = history_query(1, 1, None);
        assert_eq!(query.len(), 3);
    }

    #[test]
    fn test_client_normalizes_base_url() {
        let client = VendorClient::new(&Connection {
            base_url: "https://api.example.com/".to_string(),
            token: "Bearer t".to_string(),
            per_page: 50,
        })
        .unwrap();
        assert_eq!(client.history_url(), "https://api.example.com/api/v1/call-history");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
        assert_eq!(truncate("a😀b", 2), "a😀...");
    }

    #[test]
    fn test_safe_slice_utf8_multibyte() {
        let s = "a😀b😀c";
        assert_eq!(safe_slice(s, 0, 2), "a😀");
        assert_eq!(safe_slice(s, 2, 6), "😀b");
        assert_eq!(safe_slice(s, 0, 100), s);
    }
}
