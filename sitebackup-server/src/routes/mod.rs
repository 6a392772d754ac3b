pub mod archives;
pub mod jobs;
pub mod schedules;
pub mod settings;
pub mod status;

use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let archives_dir = state.config.archives_dir.clone();

    Router::new()
        .route("/", get(status::index))
        .route("/api/status", get(status::get_status))
        .route("/api/run", post(jobs::legacy_run))
        .route("/api/stop", post(jobs::legacy_stop))
        .nest("/api/jobs", jobs::router())
        .route("/api/list_archives", get(archives::list_archives))
        .route("/api/archives/{filename}", delete(archives::delete_archive))
        .nest_service("/download_archive", ServeDir::new(archives_dir))
        .nest("/api/schedules", schedules::router())
        .route("/api/smtp", get(settings::get_smtp).post(settings::save_smtp))
        .route(
            "/api/methods/{method}",
            get(settings::get_method).put(settings::save_method),
        )
        .route("/ws", get(crate::ws::ui::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
