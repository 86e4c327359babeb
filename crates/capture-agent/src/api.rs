use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use capture_net::ReachabilityMonitor;
use capture_shared::{Document, FieldType, LocalImage, SyncStatus};
use capture_store::ImageStore;
use capture_sync::{DrainSummary, QueueCoordinator};

use crate::error::AgentError;

/// Raw camera photos can be large; they are compressed after upload.
const MAX_CAPTURE_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: QueueCoordinator,
    pub images: ImageStore,
    pub reachability: ReachabilityMonitor,
}

/// Only the listed origins get a CORS allowance. With an empty list the API
/// is reachable from same-origin pages and non-browser clients only.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/events", get(events))
        .route("/captures", post(create_capture))
        .route("/queue", get(list_queue))
        .route("/queue/:id", delete(discard_capture))
        .route("/queue/:id/retry", post(retry_capture))
        .route("/sync", post(sync_now))
        .route("/reachability", post(report_reachability))
        .route("/documents", get(list_documents))
        .route("/documents/:id", put(put_document).get(get_document))
        .layer(DefaultBodyLimit::max(MAX_CAPTURE_BYTES))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    online: bool,
    queued: usize,
    pending: usize,
    failed: usize,
    needs_attention: usize,
    /// Most recent drain, whether startup, reconnect, backoff or manual.
    last_drain: Option<DrainSummary>,
    notice: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    #[serde(flatten)]
    summary: DrainSummary,
    notice: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueQuery {
    document_id: Option<String>,
    field_type: Option<FieldType>,
}

#[derive(Deserialize)]
struct ReachabilityReport {
    online: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let queue = state.coordinator.queue().await;
    let mut counts: HashMap<SyncStatus, usize> = HashMap::new();
    for item in &queue {
        *counts.entry(item.sync_status).or_default() += 1;
    }
    let count = |status: SyncStatus| counts.get(&status).copied().unwrap_or(0);
    let last_drain = state.coordinator.last_drain();
    let notice = last_drain.as_ref().and_then(DrainSummary::notice);

    Json(StatusResponse {
        online: state.reachability.is_online(),
        queued: queue.len(),
        pending: count(SyncStatus::Pending) + count(SyncStatus::Uploading),
        failed: count(SyncStatus::Failed),
        needs_attention: count(SyncStatus::NeedsAttention),
        last_drain,
        notice,
    })
}

/// Coordinator events as server-sent events, one JSON object per event.
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.coordinator.subscribe_events();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Event::default().json_data(&event), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Fields of a `POST /captures` form.
struct CaptureForm {
    photo: Vec<u8>,
    document_id: String,
    document_number: String,
    field_type: FieldType,
    field_index: usize,
    field_name: String,
}

impl CaptureForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AgentError> {
        let mut photo = None;
        let mut text: BTreeMap<String, String> = BTreeMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AgentError::BadRequest(format!("Multipart error: {e}")))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "photo" {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AgentError::BadRequest(format!("Failed to read photo: {e}")))?;
                photo = Some(data.to_vec());
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AgentError::BadRequest(format!("Failed to read {name}: {e}")))?;
                text.insert(name, value);
            }
        }

        let mut take = |key: &str| {
            text.remove(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AgentError::BadRequest(format!("Missing '{key}' field")))
        };

        let document_id = take("documentId")?;
        let document_number = take("documentNumber")?;
        let field_type = take("fieldType")?
            .parse::<FieldType>()
            .map_err(|e| AgentError::BadRequest(e.to_string()))?;
        let field_index = take("fieldIndex")?
            .parse::<usize>()
            .map_err(|e| AgentError::BadRequest(format!("Invalid fieldIndex: {e}")))?;
        let field_name = take("fieldName")?;
        let photo = photo
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AgentError::BadRequest("Missing 'photo' field".to_string()))?;

        Ok(Self {
            photo,
            document_id,
            document_number,
            field_type,
            field_index,
            field_name,
        })
    }
}

async fn create_capture(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<LocalImage>), AgentError> {
    let form = CaptureForm::read(multipart).await?;
    let captured_at = Utc::now();

    let path = state
        .images
        .store_capture(
            form.photo,
            &form.document_id,
            form.field_type,
            form.field_index,
            captured_at,
        )
        .await?;

    let image = LocalImage::new(
        form.document_id,
        form.document_number,
        form.field_type,
        form.field_index,
        form.field_name,
        format!("file://{}", path.display()),
        captured_at,
    );
    let queued = state.coordinator.enqueue(image).await;

    Ok((StatusCode::CREATED, Json(queued)))
}

async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<LocalImage>>, AgentError> {
    let items = match (query.document_id, query.field_type) {
        (Some(doc), Some(field_type)) => state.coordinator.query_by_field(&doc, field_type).await,
        (Some(doc), None) => state
            .coordinator
            .queue()
            .await
            .into_iter()
            .filter(|img| img.document_id == doc)
            .collect(),
        (None, None) => state.coordinator.queue().await,
        (None, Some(_)) => {
            return Err(AgentError::BadRequest(
                "fieldType requires documentId".to_string(),
            ))
        }
    };
    Ok(Json(items))
}

async fn discard_capture(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LocalImage>, AgentError> {
    state
        .coordinator
        .discard(&id)
        .await
        .map(Json)
        .ok_or(AgentError::NotFound(id))
}

async fn retry_capture(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AgentError> {
    if !state.coordinator.retry_item(&id).await {
        return Err(AgentError::NotFound(id));
    }
    Ok(Json(serde_json::json!({ "retried": true })))
}

async fn sync_now(State(state): State<AppState>) -> Json<SyncResponse> {
    info!("Manual sync requested");
    let summary = state.coordinator.sync_now().await;
    let notice = summary.notice();
    Json(SyncResponse { summary, notice })
}

async fn report_reachability(
    State(state): State<AppState>,
    Json(report): Json<ReachabilityReport>,
) -> StatusCode {
    state.reachability.report_platform_change(report.online);
    StatusCode::NO_CONTENT
}

async fn put_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(document): Json<Document>,
) -> Result<StatusCode, AgentError> {
    if document.id != id {
        return Err(AgentError::BadRequest(format!(
            "Document id {} does not match path {id}",
            document.id
        )));
    }
    state.coordinator.upsert_document(document).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_documents(State(state): State<AppState>) -> Json<Vec<Document>> {
    Json(state.coordinator.documents().await)
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AgentError> {
    state
        .coordinator
        .document(&id)
        .await
        .map(Json)
        .ok_or(AgentError::NotFound(id))
}

pub async fn serve(
    state: AppState,
    addr: std::net::SocketAddr,
    allowed_origins: &[String],
) -> anyhow::Result<()> {
    let app = build_router(state, allowed_origins);

    info!(addr = %addr, "Starting local capture API");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
