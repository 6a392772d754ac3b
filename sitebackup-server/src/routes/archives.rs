use crate::error::AppError;
use crate::models::archive;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct ArchiveListing {
    pub filename: String,
    pub method: sitebackup_engine::Method,
    pub size: String,
    pub size_bytes: i64,
    pub status: String,
    pub created: String,
    /// False when the record outlived its file.
    pub available: bool,
}

pub async fn list_archives(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ArchiveListing>>, AppError> {
    let db = state.db.clone();
    let dir = state.config.archives_dir.clone();
    let tz = state.config.timezone;

    let listing = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        let rows = archive::find_all(&conn)?;
        Ok::<_, anyhow::Error>(
            rows.into_iter()
                .map(|row| ArchiveListing {
                    available: dir.join(&row.filename).is_file(),
                    size: format!("{} MB", row.size_mb()),
                    created: row.timestamp.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
                    filename: row.filename,
                    method: row.method,
                    size_bytes: row.size_bytes,
                    status: row.status,
                })
                .collect::<Vec<_>>(),
        )
    })
    .await??;

    Ok(Json(listing))
}

pub async fn delete_archive(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<StatusCode, AppError> {
    if !is_safe_filename(&filename) {
        return Err(AppError::BadRequest("Invalid archive name".into()));
    }

    let db = state.db.clone();
    let path = state.config.archives_dir.join(&filename);
    let name = filename.clone();
    let (had_record, had_file) = tokio::task::spawn_blocking(move || {
        let had_file = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(anyhow::Error::from(e)),
        };
        let conn = db.get()?;
        let had_record = archive::delete(&conn, &name)?;
        Ok((had_record, had_file))
    })
    .await??;

    if !had_record && !had_file {
        return Err(AppError::NotFound("Archive not found".into()));
    }
    tracing::info!(filename = %filename, "Archive deleted");
    state
        .ui
        .broadcast("archive:deleted", serde_json::json!({ "filename": filename }));
    Ok(StatusCode::NO_CONTENT)
}

/// A bare file name: no separators, no parent references.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert!(is_safe_filename("sftp_backup_20240726_030000.tar.gz"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("nested/file.tar.gz"));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename(""));
    }
}
