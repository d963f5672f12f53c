//! HTTP surface: webhook receiver, recording proxy, player page and
//! click-to-call redirects.
//!
//! Storage and the vendor client are blocking, so every handler that
//! touches them hops onto `spawn_blocking`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::{fetch_recording, VendorClient};
use crate::config::Settings;
use crate::db::calls::get_call;
use crate::notify::InboxNotifier;
use crate::sync::{run_sync, SyncSummary, AUTO_PAGE_LIMIT};
use crate::webhook::{authorize, ingest, records_from, WebhookBody};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(conn: Connection, settings: Settings) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            settings: Arc::new(settings),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/call", post(receive_webhook))
        .route("/stream/{id}", get(stream_recording))
        .route("/player/{id}", get(player_page))
        .route("/sip/call", get(dial_query))
        .route("/sip/{*number}", get(dial_path))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process is stopped, optionally polling the vendor every
/// `poll` interval.
pub async fn serve(state: AppState, addr: SocketAddr, poll: Option<Duration>) -> Result<()> {
    if let Some(every) = poll {
        spawn_poller(state.clone(), every);
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Starting HTTP server on {addr}");
    eprintln!("[callsync] Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server error")?;
    Ok(())
}

/// Run `f` against the shared connection on the blocking pool.
async fn blocking<T, F>(state: AppState, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &Settings) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = state
            .db
            .lock()
            .map_err(|_| anyhow!("Database lock poisoned"))?;
        f(&conn, &state.settings)
    })
    .await
    .map_err(|e| anyhow!("Blocking task failed: {}", e))?
}

fn internal_error(err: anyhow::Error) -> Response {
    error!("Request failed: {:#}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
}

// ============================================================================
// Webhook
// ============================================================================

fn redacted_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == AUTHORIZATION {
                "<redacted>".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            format!("{}: {}", name, shown)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

async fn receive_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if !authorize(auth, state.settings.webhook_secret.as_deref()) {
        warn!("Rejected webhook (bad or missing secret); headers: {}", redacted_headers(&headers));
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "error": "unauthorized"})),
        )
            .into_response();
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let Some(value) = WebhookBody::classify(content_type, &body).into_value() else {
        warn!("Webhook body is not JSON ({} bytes)", body.len());
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "error": "unreadable payload"})),
        )
            .into_response();
    };

    let records = records_from(value);
    debug!("Webhook delivered {} record(s)", records.len());
    match blocking(state, move |conn, settings| Ok(ingest(conn, settings, &records))).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// Recording proxy and player
// ============================================================================

async fn stream_recording(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let call = match blocking(state, move |conn, _| get_call(conn, id)).await {
        Ok(Some(call)) => call,
        Ok(None) => return (StatusCode::NOT_FOUND, "Call not found").into_response(),
        Err(e) => return internal_error(e),
    };
    let Some(url) = call.recording_url().map(str::to_string) else {
        return (StatusCode::NOT_FOUND, "No recording URL on this call.").into_response();
    };

    match tokio::task::spawn_blocking(move || fetch_recording(&url)).await {
        Ok(Ok(recording)) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, recording.content_type),
                (
                    CONTENT_DISPOSITION,
                    format!("inline; filename=\"call_{}.mp3\"", id),
                ),
                (CACHE_CONTROL, "no-cache".to_string()),
            ],
            recording.bytes,
        )
            .into_response(),
        Ok(Err(e)) => {
            warn!("Recording fetch for call {} failed: {}", id, e);
            (StatusCode::BAD_GATEWAY, format!("Failed to fetch recording: {}", e)).into_response()
        }
        Err(e) => internal_error(anyhow!("Recording task failed: {}", e)),
    }
}

async fn player_page(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let call = match blocking(state, move |conn, _| get_call(conn, id)).await {
        Ok(Some(call)) => call,
        Ok(None) => return (StatusCode::NOT_FOUND, "Call not found").into_response(),
        Err(e) => return internal_error(e),
    };

    let inner = if call.has_recording {
        format!(
            r#"<audio controls autoplay preload="none" src="/stream/{}"></audio>"#,
            id
        )
    } else {
        "<p>No recording for this call.</p>".to_string()
    };
    Html(format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Call {id}</title>
<style>body{{margin:0;padding:8px;font-family:sans-serif}}audio{{width:100%}}</style>
</head><body>{inner}</body></html>"#
    ))
    .into_response()
}

// ============================================================================
// Click-to-call
// ============================================================================

#[derive(Debug, Deserialize)]
struct DialQuery {
    n: Option<String>,
    number: Option<String>,
    scheme: Option<String>,
}

/// Keep what a dialer understands: a leading `+`, digits, `*`.
fn clean_dial_number(raw: &str) -> String {
    let raw = raw.trim();
    let (plus, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (true, rest)
    } else if raw.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("%2b")) {
        (true, &raw[3..])
    } else {
        (false, raw)
    };
    let body: String = rest
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '*')
        .collect();
    if body.is_empty() {
        return String::new();
    }
    if plus { format!("+{}", body) } else { body }
}

fn dial_page(raw: &str, scheme: Option<&str>) -> Response {
    let number = clean_dial_number(raw);
    if number.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing phone number").into_response();
    }
    let (primary, alternate) = match scheme.map(str::to_ascii_lowercase).as_deref() {
        Some("tel") => ("tel", "sip"),
        _ => ("sip", "tel"),
    };
    let target = format!("{}:{}", primary, number);
    let fallback = format!("{}:{}", alternate, number);

    Html(format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8">
<meta http-equiv="refresh" content="0; url={target}">
<title>Calling {number}</title></head>
<body><script>window.location.replace("{target}");</script>
<p>Calling <a href="{target}">{number}</a> (or <a href="{fallback}">{alternate}</a>)</p>
</body></html>"#
    ))
    .into_response()
}

async fn dial_query(Query(query): Query<DialQuery>) -> Response {
    let number = query.n.or(query.number).unwrap_or_default();
    dial_page(&number, query.scheme.as_deref())
}

async fn dial_path(Path(number): Path<String>) -> Response {
    dial_page(&number, None)
}

/// `/sip:+998…` style links can't be expressed as a route.
async fn fallback(uri: Uri) -> Response {
    match uri.path().strip_prefix("/sip:") {
        Some(number) => dial_page(number, Some("sip")),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

// ============================================================================
// Scheduled sync
// ============================================================================

fn spawn_poller(state: AppState, every: Duration) {
    info!("Scheduled sync every {:?}", every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let state = state.clone();
            match tokio::task::spawn_blocking(move || poll_once(&state)).await {
                Ok(Ok(summary)) => info!(
                    "Scheduled sync: {} processed, {} created, {} updated",
                    summary.processed, summary.created, summary.updated
                ),
                Ok(Err(e)) => warn!("Scheduled sync failed: {:#}", e),
                Err(e) => error!("Scheduled sync task failed: {}", e),
            }
        }
    });
}

fn poll_once(state: &AppState) -> Result<SyncSummary> {
    let connection = state.settings.connection()?;
    let client = VendorClient::new(&connection)?;
    let conn = state
        .db
        .lock()
        .map_err(|_| anyhow!("Database lock poisoned"))?;
    let notifier = InboxNotifier::new(&conn);
    run_sync(
        &conn,
        &client,
        &state.settings,
        &notifier,
        AUTO_PAGE_LIMIT,
        Utc::now(),
        &mut |phase| debug!("Scheduled sync: {:?}", phase),
    )
}
