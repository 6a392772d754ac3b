//! Starts admitted jobs on the blocking pool. Shared by the HTTP routes and
//! the cron dispatcher.

use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::models::settings;
use sitebackup_engine::{Engine, Method, RemoteConfig};
use std::sync::Arc;

pub struct JobLauncher {
    engine: Arc<Engine>,
    db: DbPool,
    config: AppConfig,
}

impl JobLauncher {
    pub fn new(engine: Arc<Engine>, db: DbPool, config: AppConfig) -> Self {
        Self { engine, db, config }
    }

    /// Start a run of `method` in the background. Returns `false` when one is
    /// already running; nothing is queued in that case.
    pub fn start(&self, method: Method) -> bool {
        let Some(ticket) = self.engine.begin(method) else {
            return false;
        };

        let engine = self.engine.clone();
        let db = self.db.clone();
        let fallback = self.config.method_default(method);

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                let remote = load_remote_config(&db, method, fallback);
                engine.run(ticket, &remote)
            })
            .await;

            match result {
                Ok(outcome) => {
                    tracing::info!(method = %method, result = %outcome.summary(), "Backup run completed")
                }
                // The ticket was dropped while unwinding, so the method is already released.
                Err(e) => tracing::error!(method = %method, error = %e, "Backup run panicked"),
            }
        });
        true
    }

    pub fn stop(&self, method: Method) -> bool {
        self.engine.stop(method)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

fn load_remote_config(db: &DbPool, method: Method, fallback: RemoteConfig) -> RemoteConfig {
    let loaded = db
        .get()
        .map_err(anyhow::Error::from)
        .and_then(|conn| settings::method_config(&conn, method, fallback.clone()));
    match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(method = %method, error = %e, "Failed to load method settings, using environment");
            fallback
        }
    }
}

/// Launcher over an in-memory database with no method configured.
#[cfg(test)]
pub fn test_launcher(dir: &tempfile::TempDir) -> JobLauncher {
    use crate::db::connection::memory_pool;
    use crate::services::mailer::{DbArchiveStore, SmtpNotifier};
    use sitebackup_engine::StorageLayout;

    let pool = memory_pool();
    let layout = StorageLayout {
        data_dir: dir.path().join("data"),
        archive_dir: dir.path().join("archives"),
        timezone: chrono_tz::UTC,
    };
    let engine = Arc::new(Engine::new(
        layout,
        Arc::new(SmtpNotifier::new(pool.clone())),
        Arc::new(DbArchiveStore::new(pool.clone())),
    ));
    let mut config = AppConfig::from_env();
    config.method_defaults.clear();
    JobLauncher::new(engine, pool, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitebackup_engine::JobPhase;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unconfigured_method_finishes_as_config_failure() {
        let dir = TempDir::new().unwrap();
        let launcher = test_launcher(&dir);

        assert!(launcher.start(Method::Sftp));

        let mut status = launcher.engine().method_status(Method::Sftp);
        for _ in 0..100 {
            if !status.running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = launcher.engine().method_status(Method::Sftp);
        }
        assert!(!status.running);
        assert_eq!(status.phase, JobPhase::ConfigFailed);
    }

    #[tokio::test]
    async fn test_stop_idle_method_is_noop() {
        let dir = TempDir::new().unwrap();
        let launcher = test_launcher(&dir);
        assert!(!launcher.stop(Method::Cpanel));
    }
}
