use crate::error::AppError;
use crate::models::settings::{self, SmtpConfig};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sitebackup_engine::{Method, RemoteConfig};
use std::sync::Arc;

const MASK: &str = "********";

pub async fn get_smtp(State(state): State<Arc<AppState>>) -> Result<Json<SmtpConfig>, AppError> {
    let db = state.db.clone();
    let config = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        settings::smtp_config(&conn)
    })
    .await??;

    let mut config = config.unwrap_or_default();
    if !config.password.is_empty() {
        config.password = MASK.to_string();
    }
    Ok(Json(config))
}

pub async fn save_smtp(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<SmtpConfig>,
) -> Result<StatusCode, AppError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        // Echoed mask keeps the stored password.
        if body.password == MASK {
            body.password = settings::smtp_config(&conn)?
                .map(|c| c.password)
                .unwrap_or_default();
        }
        settings::save_smtp_config(&conn, &body)
    })
    .await??;

    tracing::info!("SMTP settings updated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_method(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
) -> Result<Json<RemoteConfig>, AppError> {
    let method: Method = method.parse()?;
    let db = state.db.clone();
    let fallback = state.config.method_default(method);
    let mut config = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        settings::method_config(&conn, method, fallback)
    })
    .await??;

    if !config.secret.is_empty() {
        config.secret = MASK.to_string();
    }
    Ok(Json(config))
}

pub async fn save_method(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    Json(mut body): Json<RemoteConfig>,
) -> Result<StatusCode, AppError> {
    let method: Method = method.parse()?;
    if body.port == 0 {
        body.port = method.default_port();
    }

    let db = state.db.clone();
    let fallback = state.config.method_default(method);
    tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        if body.secret == MASK {
            body.secret = settings::method_config(&conn, method, fallback)?.secret;
        }
        settings::save_method_config(&conn, method, &body)
    })
    .await??;

    tracing::info!(method = %method, "Method settings updated");
    Ok(StatusCode::NO_CONTENT)
}
