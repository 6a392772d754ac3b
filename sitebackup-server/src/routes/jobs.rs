use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sitebackup_engine::{Method, MethodStatus};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{method}", get(get_job))
        .route("/{method}/run", post(run_job))
        .route("/{method}/stop", post(stop_job))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
) -> Result<Json<MethodStatus>, AppError> {
    let method: Method = method.parse()?;
    Ok(Json(state.engine().method_status(method)))
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let method: Method = method.parse()?;
    let accepted = state.launcher.start(method);
    Ok(Json(serde_json::json!({ "accepted": accepted })))
}

async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
) -> Result<StatusCode, AppError> {
    let method: Method = method.parse()?;
    state.launcher.stop(method);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/run`: the single-method trigger, bound to SFTP.
pub async fn legacy_run(State(state): State<Arc<AppState>>) -> StatusCode {
    state.launcher.start(Method::Sftp);
    StatusCode::NO_CONTENT
}

/// `POST /api/stop`
pub async fn legacy_stop(State(state): State<Arc<AppState>>) -> StatusCode {
    state.launcher.stop(Method::Sftp);
    StatusCode::NO_CONTENT
}
