mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;
mod state;
mod utils;
mod ws;

use crate::config::AppConfig;
use crate::db::connection::create_pool;
use crate::db::migrate::migrate;
use crate::services::backup_scheduler::BackupScheduler;
use crate::services::cpu_monitor::start_cpu_monitor;
use crate::services::launcher::JobLauncher;
use crate::services::mailer::{DbArchiveStore, SmtpNotifier};
use crate::state::AppState;
use sitebackup_engine::{Engine, StorageLayout};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    utils::logger::init(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()))?;

    let config = AppConfig::from_env();
    tracing::info!(
        "Starting site backup server on port {} (timezone {})",
        config.port,
        config.timezone.name()
    );

    // Initialize database
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.db_path.to_string_lossy().to_string();
    let pool = create_pool(&db_path)?;
    migrate(&pool, &config.data_dir, &config.archives_dir)?;

    // Engine and its database-backed seams
    let layout = StorageLayout {
        data_dir: config.data_dir.clone(),
        archive_dir: config.archives_dir.clone(),
        timezone: config.timezone,
    };
    let engine = Arc::new(Engine::new(
        layout,
        Arc::new(SmtpNotifier::new(pool.clone())),
        Arc::new(DbArchiveStore::new(pool.clone())),
    ));
    let launcher = Arc::new(JobLauncher::new(engine.clone(), pool.clone(), config.clone()));

    // Cron dispatch
    let scheduler = Arc::new(BackupScheduler::new(launcher.clone(), config.timezone).await?);
    match scheduler.reload(&pool).await {
        Ok(count) => tracing::info!(count, "Cron schedules initialized"),
        Err(e) => tracing::warn!("Failed to initialize schedules: {}", e),
    }
    if let Err(e) = scheduler.start().await {
        tracing::warn!("Failed to start scheduler: {}", e);
    }

    let state = Arc::new(AppState::new(pool, config.clone(), launcher, scheduler.clone()));

    // Background services
    let cancel = CancellationToken::new();
    start_cpu_monitor(
        engine.clone(),
        Duration::from_secs(config.cpu_sample_secs),
        cancel.clone(),
    );
    state.ui.forward_engine_events(engine.subscribe(), cancel.clone());

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Cleanup
    tracing::info!("Shutting down...");
    cancel.cancel();

    for method in sitebackup_engine::Method::ALL {
        engine.stop(method);
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown error: {}", e);
    }

    db::connection::close_pool(&state.db);
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
