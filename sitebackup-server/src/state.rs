use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::services::backup_scheduler::BackupScheduler;
use crate::services::launcher::JobLauncher;
use crate::ws::ui::UiBroadcaster;
use sitebackup_engine::Engine;
use std::sync::Arc;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub ui: UiBroadcaster,
    pub launcher: Arc<JobLauncher>,
    pub scheduler: Arc<BackupScheduler>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: AppConfig,
        launcher: Arc<JobLauncher>,
        scheduler: Arc<BackupScheduler>,
    ) -> Self {
        Self {
            db,
            config,
            ui: UiBroadcaster::new(),
            launcher,
            scheduler,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        self.launcher.engine()
    }
}
