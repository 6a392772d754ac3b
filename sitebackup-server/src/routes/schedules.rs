use crate::error::AppError;
use crate::models::schedule::{self, ScheduleRequest};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sitebackup_engine::schedule::{compute_next_fire, ScheduleRule};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route("/{id}", put(update_schedule).delete(delete_schedule))
}

#[derive(Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub rule: ScheduleRule,
    pub next_run: Option<DateTime<Tz>>,
}

fn view(rule: ScheduleRule, now: DateTime<Utc>, tz: Tz) -> ScheduleView {
    ScheduleView {
        next_run: compute_next_fire(&rule, now, &tz),
        rule,
    }
}

async fn list_schedules(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ScheduleView>>, AppError> {
    let db = state.db.clone();
    let rules = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        schedule::find_all(&conn)
    })
    .await??;

    let now = Utc::now();
    let tz = state.config.timezone;
    Ok(Json(rules.into_iter().map(|r| view(r, now, tz)).collect()))
}

fn validate(req: &ScheduleRequest) -> Result<(), AppError> {
    req.to_rule(0)
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleView>), AppError> {
    validate(&body)?;

    let db = state.db.clone();
    let rule = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        schedule::create(&conn, &body)
    })
    .await??;

    reschedule(&state).await?;
    Ok((StatusCode::CREATED, Json(view(rule, Utc::now(), state.config.timezone))))
}

async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<ScheduleView>, AppError> {
    validate(&body)?;

    let db = state.db.clone();
    let rule = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        schedule::update(&conn, id, &body)
    })
    .await??;

    let Some(rule) = rule else {
        return Err(AppError::NotFound("Schedule not found".into()));
    };
    reschedule(&state).await?;
    Ok(Json(view(rule, Utc::now(), state.config.timezone)))
}

async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let db = state.db.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        schedule::delete(&conn, id)
    })
    .await??;

    if !deleted {
        return Err(AppError::NotFound("Schedule not found".into()));
    }
    reschedule(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rebuild the dispatch table after any rule change.
async fn reschedule(state: &AppState) -> Result<(), AppError> {
    let count = state.scheduler.reload(&state.db).await?;
    state
        .ui
        .broadcast("schedule:changed", serde_json::json!({ "count": count }));
    Ok(())
}
