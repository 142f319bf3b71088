//! HTTP routing for the display's JSON API.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::chat;
use crate::error::{ServiceError, ServiceResult};
use crate::integrations::run_blocking;
use crate::metadata::{PKG_NAME, PKG_VERSION};
use crate::server::AppState;
use crate::stores::events::DEFAULT_WINDOW_DAYS;
use crate::types::{
    AnnouncementPatch, AssetPatch, AssetStatus, CountdownPatch, DashboardPatch, DocumentStatus,
    EventPatch, EventType, NewAnnouncement, NewAsset, NewCountdown, NewDocument, NewEvent,
    NewStaffMember, Priority, StaffPatch, StaffStatus, TargetDate,
};

pub type HttpResponse = Response<Full<Bytes>>;

/// Uploads carry whole documents inline.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Dispatch `$method` over the listed verbs, answering 405 for anything else.
macro_rules! methods {
    ($method:expr, { $($verb:ident => $body:expr),+ $(,)? }) => {
        match *$method {
            $(Method::$verb => $body,)+
            _ => method_not_allowed(&[$(stringify!($verb)),+]),
        }
    };
}

pub async fn handle(state: Arc<AppState>, req: Request<Incoming>) -> HttpResponse {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(err) => {
            tracing::warn!(path = %parts.uri.path(), "failed to read request body: {err}");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let response = dispatch(&state, &parts.method, &parts.uri, body).await;
    tracing::info!(
        method = %parts.method,
        path = %parts.uri.path(),
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

pub async fn dispatch(state: &AppState, method: &Method, uri: &Uri, body: Bytes) -> HttpResponse {
    let query = Query::parse(uri.query());
    let path = uri.path().trim_matches('/');
    let segments: Vec<&str> = path.split('/').collect();

    match segments.as_slice() {
        ["api", "health"] => methods!(method, { GET => health() }),

        ["api", "countdown"] => methods!(method, {
            GET => reply(list_countdowns(state).await, "Failed to fetch countdowns"),
            POST => reply(create_countdown(state, &body).await, "Failed to create countdown"),
        }),
        ["api", "countdown", id] => methods!(method, {
            PUT => reply(update_countdown(state, id, &body).await, "Failed to update countdown"),
            DELETE => reply(delete_countdown(state, id).await, "Failed to delete countdown"),
        }),

        ["api", "documents"] => methods!(method, {
            GET => reply(list_documents(state, &query).await, "Failed to fetch documents"),
            POST => reply(upload_documents(state, &body).await, "Failed to process documents"),
            DELETE => reply(clear_documents(state).await, "Failed to clear documents"),
        }),
        ["api", "documents", "stats"] => methods!(method, {
            GET => reply(document_stats(state).await, "Failed to fetch document stats"),
        }),
        ["api", "documents", "export"] => methods!(method, {
            GET => reply(export_documents(state).await, "Failed to export documents"),
        }),
        ["api", "documents", "import"] => methods!(method, {
            POST => reply(import_documents(state, &body).await, "Failed to import documents"),
        }),
        ["api", "documents", id] => methods!(method, {
            DELETE => reply(delete_document(state, id).await, "Failed to delete document"),
        }),

        ["api", "chat"] => methods!(method, { POST => chat(state, &body).await }),
        ["api", "news"] => methods!(method, {
            GET => reply(news(state).await, "Failed to fetch news"),
        }),
        ["api", "staff"] => methods!(method, {
            GET => reply(roster(state).await, "Failed to fetch staff data"),
        }),
        ["api", "prayer-times"] => methods!(method, {
            GET => reply(prayer_times(state).await, "Failed to fetch prayer times"),
        }),

        ["api", "staff-members"] => methods!(method, {
            GET => reply(list_staff(state, &query).await, "Failed to fetch staff"),
            POST => reply(add_staff(state, &body).await, "Failed to add staff member"),
        }),
        ["api", "staff-members", id] => methods!(method, {
            PUT => reply(update_staff(state, id, &body).await, "Failed to update staff member"),
            DELETE => reply(delete_staff(state, id).await, "Failed to delete staff member"),
        }),
        ["api", "staff-members", id, "status"] => methods!(method, {
            PUT => reply(set_staff_status(state, id, &body).await, "Failed to update staff member"),
        }),
        ["api", "announcements"] => methods!(method, {
            GET => reply(list_announcements(state, &query).await, "Failed to fetch announcements"),
            POST => reply(add_announcement(state, &body).await, "Failed to add announcement"),
        }),
        ["api", "announcements", id] => methods!(method, {
            PUT => reply(update_announcement(state, id, &body).await, "Failed to update announcement"),
            DELETE => reply(delete_announcement(state, id).await, "Failed to delete announcement"),
        }),
        ["api", "events"] => methods!(method, {
            GET => reply(list_events(state, &query).await, "Failed to fetch events"),
            POST => reply(add_event(state, &body).await, "Failed to add event"),
        }),
        ["api", "events", id] => methods!(method, {
            PUT => reply(update_event(state, id, &body).await, "Failed to update event"),
            DELETE => reply(delete_event(state, id).await, "Failed to delete event"),
        }),
        ["api", "assets"] => methods!(method, {
            GET => reply(list_assets(state, &query).await, "Failed to fetch assets"),
            POST => reply(add_asset(state, &body).await, "Failed to add asset"),
        }),
        ["api", "assets", id] => methods!(method, {
            PUT => reply(update_asset(state, id, &body).await, "Failed to update asset"),
            DELETE => reply(delete_asset(state, id).await, "Failed to delete asset"),
        }),
        ["api", "assets", id, "status"] => methods!(method, {
            PUT => reply(set_asset_status(state, id, &body).await, "Failed to update asset"),
        }),

        ["api", "dashboard"] => methods!(method, {
            GET => reply(dashboard_layout(state).await, "Failed to fetch dashboard"),
            PUT => reply(update_dashboard(state, &body).await, "Failed to update dashboard"),
        }),
        ["api", "dashboard", "features"] => methods!(method, {
            GET => reply(enabled_features(state).await, "Failed to fetch dashboard"),
        }),
        ["api", "dashboard", "features", id, "toggle"] => methods!(method, {
            POST => reply(toggle_feature(state, id).await, "Failed to update dashboard"),
        }),
        ["api", "dashboard", "reset"] => methods!(method, {
            POST => reply(reset_dashboard(state).await, "Failed to reset dashboard"),
        }),

        _ => error_response(StatusCode::NOT_FOUND, "Not found"),
    }
}

// Response helpers

fn with_json_headers(status: StatusCode, bytes: Vec<u8>) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_json_headers(status, bytes),
        Err(err) => {
            tracing::error!("failed to serialize response: {err}");
            with_json_headers(
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal server error"}"#.to_vec(),
            )
        }
    }
}

fn ok<T: Serialize + ?Sized>(body: &T) -> ServiceResult<HttpResponse> {
    Ok(json_response(StatusCode::OK, body))
}

pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &json!({ "error": message }))
}

fn method_not_allowed(allowed: &[&str]) -> HttpResponse {
    let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

/// Turn a route result into a response. Server-side failures are logged in
/// full and reported to the client as `fallback` only.
fn reply(result: ServiceResult<HttpResponse>, fallback: &str) -> HttpResponse {
    match result {
        Ok(response) => response,
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!("{fallback}: {err}");
            } else {
                tracing::debug!("{fallback}: {err}");
            }
            error_response(status, &err.public_message(fallback))
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ServiceResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::validation(format!("Invalid JSON body: {e}")))
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

/// `{"status": "..."}` bodies accept the same labels and aliases as filters.
fn parse_status<T: FromStr<Err = String>>(body: &Bytes) -> ServiceResult<T> {
    let StatusBody { status } = parse_body(body)?;
    status.parse().map_err(ServiceError::Validation)
}

fn health() -> HttpResponse {
    json_response(
        StatusCode::OK,
        &json!({ "status": "ok", "name": PKG_NAME, "version": PKG_VERSION }),
    )
}

// Query strings

/// Decoded `key=value` pairs of a query string; later keys win.
struct Query(HashMap<String, String>);

impl Query {
    fn parse(raw: Option<&str>) -> Self {
        let mut pairs = HashMap::new();
        for part in raw.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            pairs.insert(percent_decode(key), percent_decode(value));
        }
        Query(pairs)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr<Err = String>>(&self, key: &str) -> ServiceResult<Option<T>> {
        self.get(key)
            .map(|raw| raw.parse::<T>().map_err(ServiceError::Validation))
            .transpose()
    }

    fn date(&self, key: &str) -> ServiceResult<Option<NaiveDate>> {
        self.get(key)
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| ServiceError::validation(format!("Invalid {key} date: {raw}")))
            })
            .transpose()
    }

    fn timestamp(&self, key: &str) -> ServiceResult<Option<DateTime<Utc>>> {
        self.get(key)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| ServiceError::validation(format!("Invalid {key} timestamp: {raw}")))
            })
            .transpose()
    }

    fn days(&self, key: &str) -> ServiceResult<Option<u64>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| ServiceError::validation(format!("Invalid {key}: {raw}")))
            })
            .transpose()
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = (bytes[i + 1] as char).to_digit(16).zip((bytes[i + 2] as char).to_digit(16));
                if let Some((hi, lo)) = hex {
                    out.push(((hi << 4) + lo) as u8);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// Countdowns

async fn list_countdowns(state: &AppState) -> ServiceResult<HttpResponse> {
    let mut store = state.countdowns.lock().await;
    let (active, pruned) = store.active_countdowns(Utc::now());
    if pruned {
        store.save_async().await?;
    }
    ok(&active)
}

async fn create_countdown(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let input: NewCountdown = parse_body(body)?;
    let mut store = state.countdowns.lock().await;
    let created = store
        .update_async(|s| {
            s.create_countdown(input, Utc::now(), &state.offset)
                .map_err(ServiceError::Validation)
        })
        .await?;
    ok(&created)
}

async fn update_countdown(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let patch: CountdownPatch = parse_body(body)?;
    if let Some(TargetDate::Unreadable(raw)) = &patch.target_date {
        return Err(ServiceError::validation(format!("Invalid target date {raw}")));
    }
    let mut store = state.countdowns.lock().await;
    let updated = store
        .update_async(|s| s.update_countdown(id, patch, &state.offset))
        .await?;
    ok(&updated)
}

async fn delete_countdown(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let mut store = state.countdowns.lock().await;
    store.update_async(|s| s.delete_countdown(id)).await?;
    ok(&json!({ "success": true }))
}

// Documents

async fn list_documents(state: &AppState, query: &Query) -> ServiceResult<HttpResponse> {
    let status = query.parsed::<DocumentStatus>("status")?;
    let (from, to) = (query.timestamp("from")?, query.timestamp("to")?);
    let store = state.documents.lock().await;
    let mut documents = match query.get("q").or_else(|| query.get("search")) {
        Some(text) => store.search_documents(text),
        None => store.list_documents().to_vec(),
    };
    if let Some(tag) = query.get("tag") {
        let tagged = store.documents_by_tag(tag);
        documents.retain(|d| tagged.iter().any(|t| t.id == d.id));
    }
    if let Some(status) = status {
        documents.retain(|d| d.status == status);
    }
    if from.is_some() || to.is_some() {
        let start = from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = to.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let in_range = store.documents_uploaded_between(start, end);
        documents.retain(|d| in_range.iter().any(|r| r.id == d.id));
    }
    ok(&json!({ "documents": documents }))
}

/// Store each uploaded document, then index it. A document whose indexing
/// fails stays listed with status `error`. If any document in the batch is
/// invalid, none of them are stored.
async fn upload_documents(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let payload: Value = parse_body(body)?;
    let raw = payload
        .get("documents")
        .filter(|d| d.is_array())
        .cloned()
        .ok_or_else(|| ServiceError::validation("Invalid documents format"))?;
    let inputs: Vec<NewDocument> = serde_json::from_value(raw)
        .map_err(|e| ServiceError::validation(format!("Invalid documents format: {e}")))?;
    if inputs.is_empty() {
        return Err(ServiceError::validation("No documents provided"));
    }

    let added = {
        let mut store = state.documents.lock().await;
        store
            .update_async(|s| {
                inputs
                    .into_iter()
                    .map(|input| s.add_document(input).map_err(ServiceError::Validation))
                    .collect::<ServiceResult<Vec<_>>>()
            })
            .await?
    };

    let mut processed = Vec::with_capacity(added.len());
    let mut failures = 0usize;
    for document in added {
        let outcome = state
            .retriever
            .ingest(&document.id, &document.content)
            .await
            .map_err(|err| {
                tracing::error!(document = %document.name, "indexing failed: {err}");
                failures += 1;
                err.to_string()
            });
        let mut store = state.documents.lock().await;
        processed.push(
            store
                .update_async(|s| s.mark_processed(&document.id, outcome))
                .await?,
        );
    }

    if failures > 0 {
        return Err(ServiceError::upstream(format!(
            "{failures} of {} documents failed to index",
            processed.len()
        )));
    }
    ok(&json!({ "success": true, "documents": processed }))
}

async fn clear_documents(state: &AppState) -> ServiceResult<HttpResponse> {
    let removed = {
        let mut store = state.documents.lock().await;
        store
            .update_async(|s| Ok::<_, ServiceError>(s.clear_documents()))
            .await?
    };
    let chunks = state.retriever.clear().await?;
    tracing::info!(documents = removed.len(), chunks, "document library cleared");
    ok(&json!({ "success": true, "removed": removed.len() }))
}

async fn delete_document(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let removed = {
        let mut store = state.documents.lock().await;
        store.update_async(|s| s.delete_document(id)).await?
    };
    let chunks = state.retriever.remove(&removed.id).await?;
    tracing::info!(document = %removed.name, chunks, "document deleted");
    ok(&json!({ "success": true }))
}

async fn document_stats(state: &AppState) -> ServiceResult<HttpResponse> {
    let store = state.documents.lock().await;
    ok(&store.document_stats())
}

async fn export_documents(state: &AppState) -> ServiceResult<HttpResponse> {
    let exported = state.documents.lock().await.export_documents()?;
    Ok(with_json_headers(StatusCode::OK, exported.into_bytes()))
}

/// Replace the document list with an exported array. Imported documents are
/// not re-embedded; chunks of documents that no longer exist are dropped.
async fn import_documents(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let text = std::str::from_utf8(body)
        .map_err(|_| ServiceError::validation("Import data must be UTF-8 JSON"))?;
    let (imported, live) = {
        let mut store = state.documents.lock().await;
        let imported = store
            .update_async(|s| s.import_documents(text).map_err(ServiceError::Validation))
            .await?;
        let live: Vec<String> = store.list_documents().iter().map(|d| d.id.clone()).collect();
        (imported, live)
    };
    state.retriever.prune(&live).await?;
    ok(&json!({ "success": true, "imported": imported }))
}

// Chat and upstream proxies

async fn chat(state: &AppState, body: &Bytes) -> HttpResponse {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid messages format"),
    };
    let result = match chat::parse_messages(&payload) {
        Ok(messages) => state.assistant.respond(messages).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(message) => json_response(StatusCode::OK, &json!({ "message": message })),
        Err(err) => {
            if err.status().is_server_error() {
                tracing::error!("chat failed: {err}");
            }
            error_response(err.status(), err.public_message())
        }
    }
}

async fn news(state: &AppState) -> ServiceResult<HttpResponse> {
    let settings = state.dashboard.lock().await.layout().news_settings.clone();
    let client = state.news.clone();
    let offset = state.offset;
    let articles =
        run_blocking(move || client.fetch_latest(settings.display_count, &offset)).await?;
    if articles.is_empty() {
        return Err(ServiceError::not_found("No news found at the moment."));
    }
    ok(&json!({ "articles": articles }))
}

async fn roster(state: &AppState) -> ServiceResult<HttpResponse> {
    let rows = state.fetch_roster().await?;
    ok(&rows)
}

async fn prayer_times(state: &AppState) -> ServiceResult<HttpResponse> {
    let table = state.prayer_timetable(Utc::now()).await?;
    ok(&table)
}

// Staff members

async fn list_staff(state: &AppState, query: &Query) -> ServiceResult<HttpResponse> {
    let store = state.staff.lock().await;
    match query.get("q") {
        Some(text) => ok(&store.search_staff(text)),
        None => ok(store.list_staff()),
    }
}

async fn add_staff(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let input: NewStaffMember = parse_body(body)?;
    let mut store = state.staff.lock().await;
    let added = store
        .update_async(|s| s.add_staff(input).map_err(ServiceError::Validation))
        .await?;
    ok(&added)
}

async fn update_staff(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let patch: StaffPatch = parse_body(body)?;
    let mut store = state.staff.lock().await;
    let updated = store.update_async(|s| s.update_staff(id, patch)).await?;
    ok(&updated)
}

async fn set_staff_status(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let status: StaffStatus = parse_status(body)?;
    let mut store = state.staff.lock().await;
    let updated = store
        .update_async(|s| s.update_staff_status(id, status))
        .await?;
    ok(&updated)
}

async fn delete_staff(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let mut store = state.staff.lock().await;
    store.update_async(|s| s.delete_staff(id)).await?;
    ok(&json!({ "success": true }))
}

// Announcements

async fn list_announcements(state: &AppState, query: &Query) -> ServiceResult<HttpResponse> {
    let priority = query.parsed::<Priority>("priority")?;
    let store = state.announcements.lock().await;
    match priority {
        Some(priority) => ok(&store.announcements_by_priority(priority)),
        None => ok(store.list_announcements()),
    }
}

async fn add_announcement(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let input: NewAnnouncement = parse_body(body)?;
    let mut store = state.announcements.lock().await;
    let added = store
        .update_async(|s| s.add_announcement(input).map_err(ServiceError::Validation))
        .await?;
    ok(&added)
}

async fn update_announcement(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let patch: AnnouncementPatch = parse_body(body)?;
    let mut store = state.announcements.lock().await;
    let updated = store
        .update_async(|s| s.update_announcement(id, patch))
        .await?;
    ok(&updated)
}

async fn delete_announcement(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let mut store = state.announcements.lock().await;
    store.update_async(|s| s.delete_announcement(id)).await?;
    ok(&json!({ "success": true }))
}

// Events

/// `?date=`, `?upcoming=<days>`, `?past=<days>` and `?type=` select one view;
/// a bare `upcoming` or `past` uses the default window.
async fn list_events(state: &AppState, query: &Query) -> ServiceResult<HttpResponse> {
    let now = Utc::now();
    let window = |key: &str| -> ServiceResult<Option<u64>> {
        if query.0.contains_key(key) {
            Ok(Some(query.days(key)?.unwrap_or(DEFAULT_WINDOW_DAYS)))
        } else {
            Ok(None)
        }
    };
    let (date, upcoming, past) = (query.date("date")?, window("upcoming")?, window("past")?);
    let event_type = query.parsed::<EventType>("type")?;

    let store = state.events.lock().await;
    if let Some(date) = date {
        return ok(&store.events_on(date));
    }
    if let Some(days) = upcoming {
        return ok(&store.upcoming_events(now, days, &state.offset));
    }
    if let Some(days) = past {
        return ok(&store.past_events(now, days, &state.offset));
    }
    match event_type {
        Some(event_type) => ok(&store.events_by_type(event_type)),
        None => ok(store.list_events()),
    }
}

async fn add_event(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let input: NewEvent = parse_body(body)?;
    let mut store = state.events.lock().await;
    let added = store
        .update_async(|s| s.add_event(input).map_err(ServiceError::Validation))
        .await?;
    ok(&added)
}

async fn update_event(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let patch: EventPatch = parse_body(body)?;
    let mut store = state.events.lock().await;
    let updated = store.update_async(|s| s.update_event(id, patch)).await?;
    ok(&updated)
}

async fn delete_event(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let mut store = state.events.lock().await;
    store.update_async(|s| s.delete_event(id)).await?;
    ok(&json!({ "success": true }))
}

// Assets

async fn list_assets(state: &AppState, query: &Query) -> ServiceResult<HttpResponse> {
    let status = query.parsed::<AssetStatus>("status")?;
    let store = state.assets.lock().await;
    match status {
        Some(status) => ok(&store.assets_by_status(status)),
        None => ok(store.list_assets()),
    }
}

async fn add_asset(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let input: NewAsset = parse_body(body)?;
    let mut store = state.assets.lock().await;
    let added = store
        .update_async(|s| s.add_asset(input).map_err(ServiceError::Validation))
        .await?;
    ok(&added)
}

async fn update_asset(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let patch: AssetPatch = parse_body(body)?;
    let mut store = state.assets.lock().await;
    let updated = store.update_async(|s| s.update_asset(id, patch)).await?;
    ok(&updated)
}

async fn set_asset_status(state: &AppState, id: &str, body: &Bytes) -> ServiceResult<HttpResponse> {
    let status: AssetStatus = parse_status(body)?;
    let mut store = state.assets.lock().await;
    let updated = store
        .update_async(|s| s.set_asset_status(id, status))
        .await?;
    ok(&updated)
}

async fn delete_asset(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let mut store = state.assets.lock().await;
    store.update_async(|s| s.delete_asset(id)).await?;
    ok(&json!({ "success": true }))
}

// Dashboard

async fn dashboard_layout(state: &AppState) -> ServiceResult<HttpResponse> {
    let store = state.dashboard.lock().await;
    ok(store.layout())
}

async fn update_dashboard(state: &AppState, body: &Bytes) -> ServiceResult<HttpResponse> {
    let patch: DashboardPatch = parse_body(body)?;
    let mut store = state.dashboard.lock().await;
    store
        .update_async(|s| s.apply_dashboard_patch(patch).map_err(ServiceError::Validation))
        .await?;
    ok(store.layout())
}

async fn enabled_features(state: &AppState) -> ServiceResult<HttpResponse> {
    let store = state.dashboard.lock().await;
    ok(&store.enabled_features())
}

async fn toggle_feature(state: &AppState, id: &str) -> ServiceResult<HttpResponse> {
    let mut store = state.dashboard.lock().await;
    let feature = store.update_async(|s| s.toggle_feature(id)).await?;
    ok(&feature)
}

async fn reset_dashboard(state: &AppState) -> ServiceResult<HttpResponse> {
    let mut store = state.dashboard.lock().await;
    store
        .update_async(|s| {
            s.reset_features();
            Ok::<_, ServiceError>(())
        })
        .await?;
    ok(store.layout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatModel, CompletionRequest};
    use crate::integrations::prayer::{PrayerDay, day_key};
    use crate::server::testing::{settings, state_with};
    use chrono::Duration;

    struct CannedModel;

    impl ChatModel for CannedModel {
        fn complete(&self, request: &CompletionRequest) -> ServiceResult<String> {
            Ok(format!("{} messages", request.messages.len()))
        }
    }

    async fn call(state: &AppState, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let bytes = if body.is_null() {
            Bytes::new()
        } else {
            Bytes::from(body.to_string())
        };
        let uri: Uri = uri.parse().unwrap();
        let response = dispatch(state, &method, &uri, bytes).await;
        let status = response.status();
        let raw = response.into_body().collect().await.unwrap().to_bytes();
        let value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn routing_errors() {
        let state = state_with(None);
        let (status, body) = call(&state, Method::GET, "/api/health", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&state, Method::GET, "/api/nothing", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");

        let uri: Uri = "/api/countdown".parse().unwrap();
        let response = dispatch(&state, &Method::PATCH, &uri, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");

        let response = dispatch(&state, &Method::POST, &uri, Bytes::from_static(b"{nope")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn countdown_lifecycle() {
        let state = state_with(None);
        let past = (Utc::now() - Duration::days(1)).to_rfc3339();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/countdown",
            json!({ "title": "Hari Guru", "targetDate": past }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Target date must be in the future");

        let (status, body) = call(&state, Method::POST, "/api/countdown", json!({ "title": "x" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");

        let future = (Utc::now() + Duration::days(30)).to_rfc3339();
        let (status, created) = call(
            &state,
            Method::POST,
            "/api/countdown",
            json!({ "title": "Hari Guru", "targetDate": future }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["isActive"], true);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, picked) = call(
            &state,
            Method::POST,
            "/api/countdown",
            json!({ "title": "Cuti Sekolah", "targetDate": "2099-12-25" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(picked["targetDate"], "2099-12-24T16:00:00Z");
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/countdown",
            json!({ "title": "Cuti Sekolah", "targetDate": "25/12/2099" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");

        let (_, listed) = call(&state, Method::GET, "/api/countdown", Value::Null).await;
        assert_eq!(listed.as_array().unwrap().len(), 2);

        let path = format!("/api/countdown/{id}");
        let (status, updated) = call(&state, Method::PUT, &path, json!({ "title": "Hari Guru 2026", "id": "other" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], id.as_str());
        assert_eq!(updated["title"], "Hari Guru 2026");
        let (status, _) = call(&state, Method::PUT, &path, json!({ "targetDate": "soon" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, Method::DELETE, &path, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let (status, body) = call(&state, Method::DELETE, &path, Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Countdown not found");
    }

    #[tokio::test]
    async fn upload_index_chat_and_delete() {
        let state = state_with(Some(Arc::new(CannedModel)));
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/documents",
            json!({ "documents": [{ "name": "printer.md", "content": "Printer jammed? Open tray 2." }] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let document = &body["documents"][0];
        assert_eq!(document["status"], "completed");
        assert_eq!(document["chunks"], 1);
        assert_eq!(document["fileType"], "md");
        let id = document["id"].as_str().unwrap().to_string();

        let (_, stats) = call(&state, Method::GET, "/api/documents/stats", Value::Null).await;
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["completed"], 1);

        let (_, found) = call(&state, Method::GET, "/api/documents?q=tray%202", Value::Null).await;
        assert_eq!(found["documents"].as_array().unwrap().len(), 1);
        let (_, found) = call(&state, Method::GET, "/api/documents?status=error", Value::Null).await;
        assert!(found["documents"].as_array().unwrap().is_empty());

        let (status, reply) = call(
            &state,
            Method::POST,
            "/api/chat",
            json!({ "messages": [{ "role": "user", "content": "printer jammed" }] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["message"], "2 messages");

        let (status, _) = call(&state, Method::DELETE, &format!("/api/documents/{id}"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.retriever.chunk_count().await, 0);
        let (status, _) = call(&state, Method::DELETE, &format!("/api/documents/{id}"), Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_indexing_keeps_document_as_error() {
        let state = AppState::with_backends(settings(), None, None).unwrap();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/documents",
            json!({ "documents": [{ "name": "a.txt", "content": "hello" }] }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to process documents");

        let (_, listed) = call(&state, Method::GET, "/api/documents", Value::Null).await;
        let document = &listed["documents"][0];
        assert_eq!(document["status"], "error");
        assert_eq!(document["processingError"], "OpenAI API key is not configured");

        let (status, _) = call(&state, Method::POST, "/api/documents", json!({ "documents": "a" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_document_in_batch_stores_nothing() {
        let state = state_with(None);
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/documents",
            json!({ "documents": [
                { "name": "a.txt", "content": "printer tray" },
                { "name": "b.txt", "content": "   " },
            ] }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Document 'b.txt' has no content");

        let (_, listed) = call(&state, Method::GET, "/api/documents", Value::Null).await;
        assert!(listed["documents"].as_array().unwrap().is_empty());
        let (_, stats) = call(&state, Method::GET, "/api/documents/stats", Value::Null).await;
        assert_eq!(stats["total"], 0);
        assert_eq!(stats["processing"], 0);
    }

    #[tokio::test]
    async fn clearing_documents_empties_the_index() {
        let state = state_with(None);
        let (status, _) = call(
            &state,
            Method::POST,
            "/api/documents",
            json!({ "documents": [
                { "name": "wifi.txt", "content": "wifi password is on the board" },
                { "name": "vpn.txt", "content": "vpn needs the token app" },
            ] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.retriever.chunk_count().await, 2);

        let (status, body) = call(&state, Method::DELETE, "/api/documents", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 2);
        assert_eq!(state.retriever.chunk_count().await, 0);
        let (_, listed) = call(&state, Method::GET, "/api/documents", Value::Null).await;
        assert!(listed["documents"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_save_is_not_kept_in_memory() {
        let state = state_with(None);
        let dir = state.settings.data_dir.clone();
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"").unwrap();

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/staff-members",
            json!({ "name": "Siti", "email": "siti@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to add staff member");
        let (status, _) = call(&state, Method::POST, "/api/dashboard/features/news/toggle", Value::Null).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        std::fs::remove_file(&dir).unwrap();
        let (_, staff) = call(&state, Method::GET, "/api/staff-members", Value::Null).await;
        assert_eq!(staff.as_array().unwrap().len(), 4);
        let (_, enabled) = call(&state, Method::GET, "/api/dashboard/features", Value::Null).await;
        assert_eq!(enabled.as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn chat_errors_are_generic() {
        let state = state_with(None);
        let (status, body) = call(&state, Method::POST, "/api/chat", json!({ "messages": {} })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid messages format");

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/chat",
            json!({ "messages": [{ "role": "user", "content": "hello" }] }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "OpenAI API configuration error");
    }

    #[tokio::test]
    async fn record_stores_over_http() {
        let state = state_with(None);
        let (status, added) = call(
            &state,
            Method::POST,
            "/api/staff-members",
            json!({ "name": "AMIN", "email": "amin@example.com", "status": "meeting" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = added["id"].as_str().unwrap().to_string();

        let (_, found) = call(&state, Method::GET, "/api/staff-members?q=amin", Value::Null).await;
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (_, updated) = call(
            &state,
            Method::PUT,
            &format!("/api/staff-members/{id}"),
            json!({ "status": "cuti" }),
        )
        .await;
        assert_eq!(updated["status"], "cuti");
        assert_eq!(updated["name"], "AMIN");

        let (status, _) = call(&state, Method::POST, "/api/announcements", json!({ "content": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(
            &state,
            Method::POST,
            "/api/announcements",
            json!({ "content": "Server maintenance Friday", "priority": "high" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, high) = call(&state, Method::GET, "/api/announcements?priority=high", Value::Null).await;
        assert_eq!(high.as_array().unwrap().len(), 1);

        let (status, body) = call(&state, Method::GET, "/api/assets?status=bogus", Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("bogus"));

        let tomorrow = (Utc::now() + Duration::days(1)).date_naive().to_string();
        let (status, _) = call(
            &state,
            Method::POST,
            "/api/events",
            json!({ "title": "Latihan", "date": tomorrow, "startTime": "10:00", "type": "training" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, on_day) = call(&state, Method::GET, &format!("/api/events?date={tomorrow}"), Value::Null).await;
        assert!(on_day.as_array().unwrap().iter().any(|e| e["title"] == "Latihan"));
    }

    #[tokio::test]
    async fn oversized_event_windows_still_answer() {
        let state = state_with(None);
        for uri in [
            "/api/events?upcoming=100000000",
            "/api/events?past=100000000",
            "/api/events?upcoming=18446744073709551615",
        ] {
            let (status, body) = call(&state, Method::GET, uri, Value::Null).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert!(body.is_array());
        }
        let (_, upcoming) = call(&state, Method::GET, "/api/events?upcoming=100000000", Value::Null).await;
        assert_eq!(upcoming.as_array().unwrap().len(), 2);

        let (status, _) = call(&state, Method::GET, "/api/events?upcoming=99999999999999999999", Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_routes_accept_labels() {
        let state = state_with(None);
        let (_, staff) = call(&state, Method::GET, "/api/staff-members", Value::Null).await;
        let id = staff[0]["id"].as_str().unwrap().to_string();
        let (status, updated) = call(
            &state,
            Method::PUT,
            &format!("/api/staff-members/{id}/status"),
            json!({ "status": "Mesyuarat" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "meeting");
        let (status, _) = call(
            &state,
            Method::PUT,
            &format!("/api/staff-members/{id}/status"),
            json!({ "status": "asleep" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, assets) = call(&state, Method::GET, "/api/assets", Value::Null).await;
        let id = assets[0]["id"].as_str().unwrap().to_string();
        let (status, updated) = call(
            &state,
            Method::PUT,
            &format!("/api/assets/{id}/status"),
            json!({ "status": "maintenance" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "Maintenance");
        let (status, _) = call(&state, Method::PUT, "/api/assets/nope/status", json!({ "status": "reserved" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_toggle_and_reset() {
        let state = state_with(None);
        let (status, feature) = call(&state, Method::POST, "/api/dashboard/features/news/toggle", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(feature["enabled"], false);

        let (_, enabled) = call(&state, Method::GET, "/api/dashboard/features", Value::Null).await;
        assert_eq!(enabled.as_array().unwrap().len(), 8);

        let (status, _) = call(&state, Method::PUT, "/api/dashboard", json!({ "newsSettings": { "displayCount": 0 } })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, layout) = call(&state, Method::PUT, "/api/dashboard", json!({ "chatBubbleSize": "large" })).await;
        assert_eq!(layout["chatBubbleSize"], "large");

        let (_, layout) = call(&state, Method::POST, "/api/dashboard/reset", Value::Null).await;
        assert!(layout["features"].as_array().unwrap().iter().all(|f| f["enabled"] == true));

        let (status, _) = call(&state, Method::POST, "/api/dashboard/features/nope/toggle", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prayer_times_from_cache() {
        let state = state_with(None);
        let today = Utc::now().with_timezone(&state.offset).date_naive();
        state
            .seed_prayer_days(vec![PrayerDay {
                hijri: "1448-05-07".into(),
                date: day_key(today),
                day: "Monday".into(),
                imsak: "05:36:00".into(),
                fajr: "05:46:00".into(),
                syuruk: "06:55:00".into(),
                dhuhr: "13:00:00".into(),
                asr: "16:09:00".into(),
                maghrib: "19:00:00".into(),
                isha: "20:09:00".into(),
            }])
            .await;
        let (status, table) = call(&state, Method::GET, "/api/prayer-times", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(table["zone"], "JHR02");
        assert_eq!(table["prayers"].as_array().unwrap().len(), 7);
        assert_eq!(table["prayers"][1]["name"], "Subuh");
        assert_eq!(table["prayers"][1]["time"], "05:46");
    }

    #[test]
    fn query_strings_are_decoded() {
        let query = Query::parse(Some("q=tray%202&tag=a+b&empty=&flag"));
        assert_eq!(query.get("q"), Some("tray 2"));
        assert_eq!(query.get("tag"), Some("a b"));
        assert_eq!(query.get("empty"), None);
        assert!(query.0.contains_key("flag"));
        assert_eq!(percent_decode("100%"), "100%");
    }
}
