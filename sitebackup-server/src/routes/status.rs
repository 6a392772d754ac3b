use crate::error::AppError;
use crate::models::archive;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sitebackup_engine::EngineStatus;
use std::sync::Arc;

pub async fn index() -> Json<serde_json::Value> {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into());
    Json(serde_json::json!({ "status": "ok", "hostname": hostname }))
}

#[derive(Serialize)]
pub struct DownloadStats {
    pub today: i64,
    pub total: i64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub engine: EngineStatus,
    pub dl_stats: DownloadStats,
    pub timezone: String,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let db = state.db.clone();
    let tz = state.config.timezone;
    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let (today, total) = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        archive::counts(&conn, today, &tz)
    })
    .await??;

    Ok(Json(StatusResponse {
        engine: state.engine().status(),
        dl_stats: DownloadStats { today, total },
        timezone: state.config.timezone.name().to_string(),
    }))
}
