//! HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use parley_core::ids::{JobId, UserId};
use parley_core::request::{GenerationMode, GenerationRequest, SourceDocument};
use parley_engine::{JobTracker, PipelineError};
use parley_store::{Database, LedgerRepo, StoreError};
use parley_telemetry::{LogQuery, TelemetryGuard};

use crate::orchestrator::JobOrchestrator;

/// Shared state available to all handlers.
pub struct HandlerState {
    pub db: Database,
    pub jobs: JobTracker,
    pub ledger: LedgerRepo,
    pub orchestrator: Arc<dyn JobOrchestrator>,
    pub telemetry: Option<Arc<TelemetryGuard>>,
}

impl HandlerState {
    pub fn new(db: Database, orchestrator: Arc<dyn JobOrchestrator>) -> Self {
        Self {
            jobs: JobTracker::new(db.clone()),
            ledger: LedgerRepo::new(db.clone()),
            db,
            orchestrator,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryGuard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

pub type AppState = Arc<HandlerState>;

/// Error body: `{"error": <kind>, "message": <text>}`.
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            PipelineError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: e.error_kind(),
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: e.error_kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(kind = self.kind, message = %self.message, "request failed");
        }
        (
            self.status,
            Json(json!({ "error": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

/// Submission body. The job id is generated when the caller does not supply one.
#[derive(Debug, Deserialize)]
pub struct TranscribeBody {
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub user_id: UserId,
    pub mode: GenerationMode,
    pub duration_minutes: u32,
    #[serde(default)]
    pub guide: Option<String>,
    #[serde(default)]
    pub speaker_1_name: Option<String>,
    #[serde(default)]
    pub speaker_2_name: Option<String>,
    pub documents: Vec<SourceDocument>,
}

impl TranscribeBody {
    fn into_request(self) -> GenerationRequest {
        GenerationRequest {
            job_id: self.job_id.unwrap_or_default(),
            user_id: self.user_id,
            mode: self.mode,
            duration_minutes: self.duration_minutes,
            guide: self.guide,
            speaker_1_name: self.speaker_1_name,
            speaker_2_name: self.speaker_2_name,
            documents: self.documents,
        }
    }
}

/// `POST /transcribe`
pub async fn transcribe(
    State(state): State<AppState>,
    Json(body): Json<TranscribeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.into_request();
    tracing::info!(
        job_id = %request.job_id,
        mode = ?request.mode,
        documents = request.documents.len(),
        "job submitted"
    );
    let record = state.orchestrator.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": record.job_id }))))
}

/// `GET /status/{job_id}`
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.jobs.status(&JobId::from_raw(job_id))?;
    Ok(Json(record))
}

/// `GET /output/{job_id}`: the stored transcript, while it is retained.
pub async fn output(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = JobId::from_raw(job_id);
    match state.jobs.result(&job_id) {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response()),
        Err(StoreError::NotFound(_)) => Err(ApiError::not_found(format!("no result for job {job_id}"))),
        Err(e) => Err(e.into()),
    }
}

/// `GET /ledger/{job_id}`
pub async fn ledger(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from_raw(job_id);
    state.jobs.status(&job_id)?;
    let entries = state.ledger.list(&job_id)?;
    Ok(Json(json!({ "job_id": job_id, "entries": entries })))
}

/// `POST /jobs/{job_id}/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from_raw(job_id);
    state.jobs.status(&job_id)?;
    let cancelled = state.orchestrator.cancel(&job_id);
    Ok(Json(json!({ "job_id": job_id, "cancelled": cancelled })))
}

/// `GET /jobs/{job_id}/logs`: persisted warnings and errors of one job.
pub async fn job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(sink) = state.telemetry.as_ref().and_then(|t| t.logs()) else {
        return Ok(Json(json!({ "logs": [], "enabled": false })));
    };

    let query = LogQuery {
        job_id: Some(job_id),
        limit: Some(500),
        ..Default::default()
    };
    let logs = sink.query(&query).map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        kind: "telemetry",
        message: e.to_string(),
    })?;
    Ok(Json(json!({ "logs": logs, "enabled": true })))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .db
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({ "status": if db_ok { "healthy" } else { "degraded" } })),
    )
}
