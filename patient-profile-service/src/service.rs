use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{Next, from_fn},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use graph_flow::{FlowRunner, GraphError, InMemorySessionStorage, Session, SessionStorage};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::PipelineClients,
    config::Config,
    frontend::INDEX_HTML,
    models::{
        Advice, DocumentKind, DocumentSummary, ExportQuery, FieldMap, MEDICAL_DISCLAIMER,
        PatientProfile, SessionResponse, UpdateProfileRequest, UploadedDocument, session_keys,
    },
    profile_format::{advice_to_markdown, profile_to_markdown},
    workflow::{advice_task_id, create_flow_runner, create_profile_session},
};

pub const MAX_DOCUMENTS: usize = 20;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn conflict_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn pipeline_error(message: &str, session_id: &str, err: &GraphError) -> ApiError {
    let status = match err {
        GraphError::TaskExecutionFailed(_) => StatusCode::BAD_GATEWAY,
        GraphError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        GraphError::SessionConflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": message,
            "details": err.to_string(),
            "session_id": session_id
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub flow_runner: FlowRunner,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        session_storage: Arc<dyn SessionStorage>,
        clients: &PipelineClients,
        max_upload_bytes: usize,
    ) -> Self {
        let flow_runner = create_flow_runner(session_storage.clone(), clients);
        Self {
            session_storage,
            flow_runner,
            max_upload_bytes,
        }
    }
}

pub async fn create_app(config: &Config) -> anyhow::Result<Router> {
    let clients = PipelineClients::from_config(config)?;
    let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());

    spawn_session_sweeper(session_storage.clone(), config.session_ttl);

    let app_state = AppState::new(session_storage, &clients, config.max_upload_bytes);
    Ok(build_router(app_state))
}

/// Periodically drops sessions idle for longer than `ttl`.
fn spawn_session_sweeper(storage: Arc<dyn SessionStorage>, ttl: Duration) {
    let max_idle = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match storage.purge_idle(max_idle).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired idle sessions"),
                Err(e) => error!("Session sweep failed: {}", e),
            }
        }
    });
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.max_upload_bytes;
    Router::new()
        .route("/", get(index_page))
        .route("/api", get(api_index))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(get_session).delete(delete_session))
        .route("/sessions/{session_id}/profile", put(update_profile))
        .route("/sessions/{session_id}/advice", post(generate_advice))
        .route("/sessions/{session_id}/export/profile", get(export_profile))
        .route("/sessions/{session_id}/export/advice", get(export_advice))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags each request with an `x-correlation-id` and runs it inside a span carrying it.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn api_index() -> Json<Value> {
    Json(json!({
        "service": "Patient Profile Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Extracts fields from medical documents, merges them into one patient profile and generates health recommendations",
        "endpoints": {
            "GET /": "Web form",
            "POST /sessions": "Upload documents (multipart, field 'files') and build the patient profile",
            "GET /sessions/{session_id}": "Get session status, profile and advice",
            "PUT /sessions/{session_id}/profile": "Replace the reviewed profile fields",
            "POST /sessions/{session_id}/advice": "Generate or regenerate recommendations",
            "GET /sessions/{session_id}/export/profile?format=json|markdown": "Download the profile",
            "GET /sessions/{session_id}/export/advice": "Download the recommendations",
            "DELETE /sessions/{session_id}": "Clear the session",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn create_session(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<SessionResponse> {
    let documents = read_uploaded_documents(multipart).await?;
    info!(document_count = documents.len(), "Creating patient profile session");

    let summaries: Vec<DocumentSummary> = documents.iter().map(DocumentSummary::from).collect();
    let session = create_profile_session(state.flow_runner.graph(), documents).await;
    session
        .context
        .set(session_keys::UPLOADED_DOCUMENTS, &summaries)
        .await;
    let session_id = session.id.clone();

    save_session(&state, session).await?;
    run_pipeline(&state, &session_id, "Document processing failed").await?;

    load_session_response(&state, &session_id).await
}

async fn read_uploaded_documents(mut multipart: Multipart) -> Result<Vec<UploadedDocument>, ApiError> {
    let mut documents = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read multipart body: {}", e);
                return Err((e.status(), Json(json!({ "error": e.body_text() }))));
            }
        };

        if field.name() != Some("files") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("document").to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(document = %file_name, "Failed to read upload bytes: {}", e);
                return Err((
                    e.status(),
                    Json(json!({ "error": format!("Failed to read '{}': {}", file_name, e.body_text()) })),
                ));
            }
        };

        if bytes.is_empty() {
            return Err(bad_request_error(&format!("'{}' is empty", file_name)));
        }

        let kind = DocumentKind::detect(&file_name, &bytes).ok_or_else(|| {
            (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({
                    "error": format!("'{}' is not a supported document. Upload PDF, PNG, JPEG, TIFF or BMP files.", file_name)
                })),
            )
        })?;

        documents.push(UploadedDocument {
            id: Uuid::new_v4().to_string(),
            file_name,
            kind,
            bytes: bytes.to_vec(),
        });

        if documents.len() > MAX_DOCUMENTS {
            return Err(bad_request_error(&format!(
                "At most {} documents can be processed at once",
                MAX_DOCUMENTS
            )));
        }
    }

    if documents.is_empty() {
        return Err(bad_request_error("At least one document is required"));
    }
    Ok(documents)
}

async fn save_session(state: &AppState, session: Session) -> Result<(), ApiError> {
    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to save session: {}", e);
        internal_error("Failed to save session", &e.to_string())
    })
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    match state.session_storage.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(not_found_error("Session not found", session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}

/// Run the flow from the session's current task. A failure is recorded on
/// the session so the page can show it after a reload.
async fn run_pipeline(state: &AppState, session_id: &str, failure_message: &str) -> Result<(), ApiError> {
    let session = load_session(state, session_id).await?;
    if session.context.remove(session_keys::PIPELINE_ERROR).await.is_some() {
        save_session(state, session).await?;
    }

    match state.flow_runner.run(session_id).await {
        Ok(result) => {
            info!(
                session_id = %session_id,
                status = ?result.status,
                "Pipeline run finished"
            );
            Ok(())
        }
        Err(e @ (GraphError::SessionConflict(_) | GraphError::SessionNotFound(_))) => {
            // Edited or cleared mid-run; the newer state stands
            warn!(session_id = %session_id, "Pipeline results discarded: {}", e);
            Err(pipeline_error(failure_message, session_id, &e))
        }
        Err(e) => {
            error!(session_id = %session_id, "Pipeline run failed: {}", e);
            record_pipeline_error(state, session_id, &e).await;
            Err(pipeline_error(failure_message, session_id, &e))
        }
    }
}

async fn record_pipeline_error(state: &AppState, session_id: &str, err: &GraphError) {
    // Reload so the task pointer saved by the runner is kept
    let session = match state.session_storage.get(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return,
        Err(e) => {
            error!("Failed to reload session {}: {}", session_id, e);
            return;
        }
    };

    session
        .context
        .set(session_keys::PIPELINE_ERROR, err.to_string())
        .await;
    if let Err(e) = state.session_storage.save(session).await {
        error!("Failed to record pipeline error for session {}: {}", session_id, e);
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    info!("Getting status for session: {}", session_id);
    load_session_response(&state, &session_id).await
}

async fn load_session_response(state: &AppState, session_id: &str) -> ApiResult<SessionResponse> {
    let session = load_session(state, session_id).await?;
    Ok(Json(build_session_response(&session).await))
}

async fn build_session_response(session: &Session) -> SessionResponse {
    let context = &session.context;
    let profile: Option<PatientProfile> = context.get(session_keys::PROFILE).await;
    let advice: Option<Advice> = context.get(session_keys::ADVICE).await;
    let error: Option<String> = context.get(session_keys::PIPELINE_ERROR).await;

    let status = if error.is_some() {
        "failed"
    } else if advice.is_some() {
        "advice_ready"
    } else if profile.is_some() {
        "profile_ready"
    } else {
        "pending"
    };

    SessionResponse {
        session_id: session.id.clone(),
        status: status.to_string(),
        current_task: Some(session.current_task_id.clone()),
        status_message: session.status_message.clone(),
        documents: context
            .get(session_keys::UPLOADED_DOCUMENTS)
            .await
            .unwrap_or_default(),
        processed_documents: context
            .get(session_keys::PROCESSED_DOCUMENTS)
            .await
            .unwrap_or_default(),
        profile,
        advice,
        error,
        disclaimer: MEDICAL_DISCLAIMER,
    }
}

async fn update_profile(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<SessionResponse> {
    info!("Updating reviewed profile for session: {}", session_id);

    let mut session = load_session(&state, &session_id).await?;
    let mut profile: PatientProfile = session
        .context
        .get(session_keys::PROFILE)
        .await
        .ok_or_else(|| conflict_error("No patient profile to update yet", &session_id))?;

    profile.fields = clean_fields(request.fields);
    profile.updated_at = Utc::now();

    session.context.set(session_keys::PROFILE, &profile).await;
    session.context.remove(session_keys::ADVICE).await;
    // An edited profile always goes to the advice stage next
    session.current_task_id = advice_task_id().to_string();
    session.status_message = Some("Profile updated".to_string());

    save_session(&state, session).await?;
    load_session_response(&state, &session_id).await
}

fn clean_fields(fields: FieldMap) -> FieldMap {
    fields
        .into_iter()
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .collect()
}

async fn generate_advice(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    info!("Generating advice for session: {}", session_id);

    let session = load_session(&state, &session_id).await?;
    let has_profile = session.context.contains(session_keys::PROFILE).await;
    if !has_profile || session.current_task_id != advice_task_id() {
        return Err(conflict_error(
            "Patient profile is not ready; process documents first",
            &session_id,
        ));
    }

    run_pipeline(&state, &session_id, "Failed to generate recommendations").await?;
    load_session_response(&state, &session_id).await
}

async fn export_profile(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let session = load_session(&state, &session_id).await?;
    let profile: PatientProfile = session
        .context
        .get(session_keys::PROFILE)
        .await
        .ok_or_else(|| conflict_error("No patient profile to export", &session_id))?;

    match query.format.as_deref().unwrap_or("json") {
        "json" => {
            let body = serde_json::to_string_pretty(&profile.fields)
                .map_err(|e| internal_error("Failed to serialize profile", &e.to_string()))?;
            Ok(download("patient_profile", "json", "application/json", body))
        }
        "markdown" | "md" => Ok(download(
            "patient_profile",
            "md",
            "text/markdown; charset=utf-8",
            profile_to_markdown(&profile),
        )),
        other => Err(bad_request_error(&format!(
            "Unknown export format '{}'; use 'json' or 'markdown'",
            other
        ))),
    }
}

async fn export_advice(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session = load_session(&state, &session_id).await?;
    let advice: Advice = session
        .context
        .get(session_keys::ADVICE)
        .await
        .ok_or_else(|| conflict_error("No recommendations to export", &session_id))?;

    Ok(download(
        "health_recommendations",
        "md",
        "text/markdown; charset=utf-8",
        advice_to_markdown(&advice),
    ))
}

fn download(stem: &str, extension: &str, content_type: &'static str, body: String) -> Response {
    let file_name = format!("{}_{}.{}", stem, Utc::now().format("%Y%m%d_%H%M%S"), extension);
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    load_session(&state, &session_id).await?;

    state.session_storage.delete(&session_id).await.map_err(|e| {
        error!("Failed to delete session {}: {}", session_id, e);
        internal_error("Failed to delete session", &e.to_string())
    })?;

    info!("Session {} cleared", session_id);
    Ok(StatusCode::NO_CONTENT)
}
