//! HTTP Server for the influx API.
//!
//! Each upload creates a session keyed by its dataset id. Sessions live in
//! memory until deleted, replaced by a newer upload once `max_sessions` is
//! reached (least recently loaded first), or the server stops.
//!
//! # API Endpoints
//!
//! | Method | Path                         | Description                       |
//! |--------|------------------------------|-----------------------------------|
//! | GET    | `/health`                    | Health check                      |
//! | POST   | `/api/datasets`              | Upload CSV (raw body)             |
//! | GET    | `/api/datasets/{id}`         | Load report and departments       |
//! | PUT    | `/api/datasets/{id}`         | Replace the CSV of a dataset      |
//! | DELETE | `/api/datasets/{id}`         | Drop a dataset                    |
//! | POST   | `/api/datasets/{id}/view`    | Dashboard for a filter selection  |
//! | POST   | `/api/datasets/{id}/export`  | CSV export of a filter selection  |
//! | GET    | `/api/logs`                  | SSE stream for real-time logs     |

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, VecDeque},
    convert::Infallible,     net::SocketAddr,
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, log_info, log_warning, LOG_BROADCASTER};
use super::types::{error_response, schema_error_response, DatasetResponse};
use crate::config::ServerConfig;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::models::FilterSelection;
use crate::parser::is_supported_delimiter;
use crate::present::DashboardView;
use crate::session::Session;
use crate::transform::clean::{CleanOptions, MissingValuePolicy};
use crate::transform::pipeline::LoadOptions;
use crate::validation::ColumnOverrides;

/// Sessions by dataset id, bounded to `limit` entries.
struct Sessions {
    by_id: HashMap<Uuid, Session>,
    /// Least recently loaded first.
    order: VecDeque<Uuid>,
    limit: usize,
}

impl Sessions {
    fn new(limit: usize) -> Self {
        Self {
            by_id: HashMap::new(),
            order: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Insert a session, evicting the least recently loaded ones past the limit.
    fn insert(&mut self, id: Uuid, session: Session) -> Vec<Uuid> {
        let mut evicted = Vec::new();
        while self.by_id.len() >= self.limit {
            let Some(oldest) = self.order.pop_front() else { break };
            self.by_id.remove(&oldest);
            evicted.push(oldest);
        }
        self.by_id.insert(id, session);
        self.order.push_back(id);
        evicted
    }

    fn touch(&mut self, id: &Uuid) {
        if let Some(pos) = self.order.iter().position(|k| k == id) {
            self.order.remove(pos);
            self.order.push_back(*id);
        }
    }

    fn get(&self, id: &Uuid) -> Option<&Session> {
        self.by_id.get(id)
    }

    fn get_mut(&mut self, id: &Uuid) -> Option<&mut Session> {
        self.by_id.get_mut(id)
    }

    fn remove(&mut self, id: &Uuid) -> Option<Session> {
        self.order.retain(|k| k != id);
        self.by_id.remove(id)
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<Sessions>>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(Sessions::new(config.max_sessions))),
            config: Arc::new(config),
        }
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    // Permissive CORS: the dashboard is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let max_body = state.config.max_body_bytes;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/datasets", post(upload_dataset))
        .route("/api/datasets/{id}", get(get_dataset).put(reload_dataset).delete(delete_dataset))
        .route("/api/datasets/{id}/view", post(view_dataset))
        .route("/api/datasets/{id}/export", post(export_dataset))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> ServerResult<()> {
    let port = config.port;
    let app = router(AppState::new(config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Influx server running on http://localhost:{}", port);
    println!("   POST /api/datasets           - Upload CSV file");
    println!("   POST /api/datasets/{{id}}/view - Dashboard for a selection");
    println!("   GET  /api/logs               - SSE log stream");
    println!("   GET  /health                 - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Errors
// =============================================================================

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Pipeline(PipelineError::Schema(err)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, schema_error_response(err))
            }
            ServerError::Pipeline(PipelineError::Csv(err)) => {
                (StatusCode::BAD_REQUEST, error_response(&err.to_string()))
            }
            ServerError::Pipeline(PipelineError::NoDataset) | ServerError::NotFound(_) => {
                (StatusCode::NOT_FOUND, error_response(&self.to_string()))
            }
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_response(msg)),
            ServerError::Pipeline(PipelineError::Export(_)) | ServerError::Io(_) => {
                log_error(self.to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, error_response(&self.to_string()))
            }
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "influx",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/datasets",
            "reload": "PUT /api/datasets/{id}",
            "view": "POST /api/datasets/{id}/view",
            "export": "POST /api/datasets/{id}/export",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip missed entries
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload options, passed as query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery {
    delimiter: Option<char>,
    /// `drop` (default) or `zero`
    missing: Option<MissingValuePolicy>,
    department_column: Option<String>,
    quarter_column: Option<String>,
    year_column: Option<String>,
    patient_count_column: Option<String>,
}

impl UploadQuery {
    /// Load options, rejecting delimiters the parser cannot split on.
    fn into_options(self) -> ServerResult<LoadOptions> {
        if let Some(delimiter) = self.delimiter {
            if !is_supported_delimiter(delimiter) {
                return Err(ServerError::BadRequest(format!(
                    "Unsupported delimiter {:?} (use , ; | or tab)",
                    delimiter
                )));
            }
        }
        Ok(self.into())
    }
}

impl From<UploadQuery> for LoadOptions {
    fn from(query: UploadQuery) -> Self {
        LoadOptions {
            delimiter: query.delimiter,
            overrides: ColumnOverrides {
                department: query.department_column,
                quarter: query.quarter_column,
                year: query.year_column,
                patient_count: query.patient_count_column,
            },
            clean: CleanOptions {
                missing_patient_count: query.missing.unwrap_or_default(),
            },
        }
    }
}

/// Upload CSV endpoint
async fn upload_dataset(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<DatasetResponse>)> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("No file provided".to_string()));
    }

    let options = query.into_options()?;
    log_info(format!("New upload ({} bytes)", body.len()));

    let mut session = Session::with_cache_capacity(state.config.cache_capacity);
    let loaded = session.load(&body, &options)?;
    let id = loaded.dataset.id();
    let response = DatasetResponse::new(id, loaded);

    let mut sessions = state.sessions.lock().await;
    for old in sessions.insert(id, session) {
        log_warning(format!("Session limit reached, evicted dataset {}", old));
    }
    log_info(format!("Dataset {} ready ({} active)", id, sessions.len()));

    Ok((StatusCode::CREATED, Json(response)))
}

/// Replace the CSV behind an existing dataset id.
///
/// A failed load leaves the previous dataset in place.
async fn reload_dataset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ServerResult<Json<DatasetResponse>> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("No file provided".to_string()));
    }
    let options = query.into_options()?;

    let mut sessions = state.sessions.lock().await;
    let response = {
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        log_info(format!("Reloading dataset {} ({} bytes)", id, body.len()));
        let loaded = session.load(&body, &options)?;
        DatasetResponse::new(id, loaded)
    };
    sessions.touch(&id);

    Ok(Json(response))
}

async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<DatasetResponse>> {
    let sessions = state.sessions.lock().await;
    let loaded = sessions
        .get(&id)
        .and_then(Session::loaded)
        .ok_or_else(|| ServerError::NotFound(id.to_string()))?;

    Ok(Json(DatasetResponse::new(id, loaded)))
}

async fn delete_dataset(State(state): State<AppState>, Path(id): Path<Uuid>) -> ServerResult<StatusCode> {
    match state.sessions.lock().await.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ServerError::NotFound(id.to_string())),
    }
}

/// Dashboard for a selection. An empty selection is a 200 with status "empty".
async fn view_dataset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(selection): Json<FilterSelection>,
) -> ServerResult<Json<DashboardView>> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| ServerError::NotFound(id.to_string()))?;

    session.select(selection);
    Ok(Json(session.view()?))
}

async fn export_dataset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(selection): Json<FilterSelection>,
) -> ServerResult<impl IntoResponse> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| ServerError::NotFound(id.to_string()))?;

    session.select(selection);
    let csv = session.export_csv()?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"patient_influx.csv\""),
        ],
        csv,
    ))
}
