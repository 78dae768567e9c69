//! HTTP surface for the UI and prompt-assembly collaborators.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::action::{ActionStep, PageState, PersistedAction};
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, StoreError};
use crate::plugin::{ActionSpec, PluginRegistry};
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<PluginRegistry>,
    pub store: Arc<dyn StateStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/run", post(run_action))
        .route("/api/v1/actions", get(list_actions).post(append_action))
        .route("/api/v1/actions/catalogue", get(catalogue))
        .route("/api/v1/state", get(browser_state))
        .with_state(state)
}

#[derive(Deserialize)]
struct RunRequest {
    action: SubmittedAction,
    #[serde(default)]
    persist: bool,
}

#[derive(Deserialize)]
struct SubmittedAction {
    id: i64,
    data: Value,
}

#[derive(Serialize)]
struct RunResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
}

#[derive(Deserialize)]
struct AppendRequest {
    data: Value,
}

async fn run_action(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let data = validate_step(request.action.data)?;
    let action = PersistedAction {
        id: request.action.id,
        data,
        result: None,
    };
    let result = state.dispatcher.execute(&action, request.persist).await?;
    Ok(Json(RunResponse { result }))
}

async fn append_action(
    State(state): State<AppState>,
    Json(request): Json<AppendRequest>,
) -> Result<Json<PersistedAction>, ApiError> {
    let data = validate_step(request.data)?;
    let action = state.store.append_action(&data).await?;
    Ok(Json(action))
}

async fn list_actions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PersistedAction>>, ApiError> {
    Ok(Json(state.store.actions().await?))
}

async fn catalogue(State(state): State<AppState>) -> Json<Vec<ActionSpec>> {
    Json(state.registry.catalogue())
}

async fn browser_state(State(state): State<AppState>) -> Result<Json<Option<PageState>>, ApiError> {
    Ok(Json(state.store.browser_state().await?))
}

fn validate_step(data: Value) -> Result<ActionStep, ApiError> {
    serde_json::from_value(data).map_err(|err| ApiError::InvalidShape(err.to_string()))
}

enum ApiError {
    /// The action payload does not match the ActionStep union.
    InvalidShape(String),
    /// A well-formed tag outside the current vocabulary.
    UnknownAction(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownAction(_) => ApiError::UnknownAction(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidShape(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::UnknownAction(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
