use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vibe_common::{
    CodeAgentEvent, MessageRole, MessageType, MessageWithFragment, Project, WorkflowRun,
};

use super::ws::{WsMessage, broadcast_message};
use crate::db::DbHandle;
use crate::errors::WorkflowError;
use crate::workflow::{WorkflowRunner, validate_prompt};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub runner: WorkflowRunner,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub value: String,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub value: String,
}

#[derive(Deserialize)]
pub struct SendEventRequest {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Serialize)]
pub struct ProjectCreated {
    pub project: Project,
    pub run: WorkflowRun,
}

#[derive(Serialize)]
pub struct MessageCreated {
    pub message: MessageWithFragment,
    pub run: WorkflowRun,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let msg = err.to_string();
        match err {
            WorkflowError::ProjectNotFound { .. } | WorkflowError::RunNotFound { .. } => {
                ApiError::NotFound(msg)
            }
            WorkflowError::UnknownEvent { .. } | WorkflowError::InvalidPrompt(_) => {
                ApiError::BadRequest(msg)
            }
            WorkflowError::AlreadyRunning { .. } => ApiError::Conflict(msg),
            WorkflowError::Other(e) => ApiError::Internal(format!("{:#}", e)),
        }
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::Internal(format!("{:#}", e))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project))
        .route(
            "/api/projects/{id}/messages",
            get(list_messages).post(create_message),
        )
        .route("/api/projects/{id}/runs", get(list_runs))
        .route("/api/events", post(send_event))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/replay", post(replay_run))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "clever", "cosmic", "crisp", "eager", "gentle", "golden", "happy",
    "lively", "lucky", "mellow", "nimble", "quiet", "rapid", "shiny", "silver", "sunny", "swift",
];

const NOUNS: &[&str] = &[
    "badger", "canyon", "comet", "falcon", "forest", "harbor", "lantern", "meadow", "otter",
    "panda", "pebble", "phoenix", "river", "rocket", "sparrow", "summit", "tiger", "violet",
    "willow", "zephyr",
];

/// Two-word kebab-case name such as `sunny-otter`.
pub fn generate_project_name() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let noun = NOUNS[bytes[1] as usize % NOUNS.len()];
    format!("{}-{}", adjective, noun)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_projects(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let projects = state
        .db
        .call(|db| db.list_projects())
        .await
        .map_err(internal)?;
    Ok(Json(projects))
}

/// Create a project from its first prompt and start building it.
async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_prompt(&req.value)?;
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(generate_project_name);
    let value = req.value.clone();
    let (project, message) = state
        .db
        .call(move |db| {
            let project = db.create_project(&name)?;
            let message = db.create_message(
                project.id,
                MessageRole::User,
                &value,
                MessageType::Result,
                None,
            )?;
            Ok((project, message))
        })
        .await
        .map_err(internal)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ProjectCreated {
            project: project.clone(),
        },
    );
    broadcast_message(&state.ws_tx, &WsMessage::MessageCreated { message });

    let run = state
        .runner
        .trigger(CodeAgentEvent::new(project.id, req.value))
        .await?;
    Ok((StatusCode::CREATED, Json(ProjectCreated { project, run })))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| db.get_project(id))
        .await
        .map_err(internal)?;
    match project {
        Some(project) => Ok(Json(project)),
        None => Err(ApiError::NotFound(format!("Project {} not found", id))),
    }
}

async fn list_messages(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .db
        .call(move |db| {
            if db.get_project(project_id)?.is_none() {
                return Ok(None);
            }
            db.list_messages(project_id).map(Some)
        })
        .await
        .map_err(internal)?;
    messages
        .map(Json)
        .ok_or_else(|| ApiError::from(WorkflowError::ProjectNotFound { id: project_id }))
}

/// Post a follow-up prompt to a project and start a run for it.
async fn create_message(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_prompt(&req.value)?;
    let value = req.value.clone();
    let message = state
        .db
        .call(move |db| {
            if db.get_project(project_id)?.is_none() {
                return Ok(None);
            }
            db.create_message(project_id, MessageRole::User, &value, MessageType::Result, None)
                .map(Some)
        })
        .await
        .map_err(internal)?
        .ok_or(WorkflowError::ProjectNotFound { id: project_id })?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::MessageCreated {
            message: message.clone(),
        },
    );

    let run = state
        .runner
        .trigger(CodeAgentEvent::new(project_id, req.value))
        .await?;
    Ok((StatusCode::CREATED, Json(MessageCreated { message, run })))
}

async fn list_runs(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = state
        .db
        .call(move |db| {
            if db.get_project(project_id)?.is_none() {
                return Ok(None);
            }
            db.list_runs(project_id).map(Some)
        })
        .await
        .map_err(internal)?;
    runs.map(Json)
        .ok_or_else(|| ApiError::from(WorkflowError::ProjectNotFound { id: project_id }))
}

/// Raw event intake: `{"name": "code-agent/run", "data": {...}}`.
async fn send_event(
    State(state): State<SharedState>,
    Json(req): Json<SendEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state.runner.send(&req.name, req.data).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .db
        .call(move |db| db.get_run(id))
        .await
        .map_err(internal)?;
    match run {
        Some(run) => Ok(Json(run)),
        None => Err(ApiError::from(WorkflowError::RunNotFound { id })),
    }
}

async fn replay_run(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state.runner.replay(id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

// ── Tests ─────────────────────────────────────────────────────────────
