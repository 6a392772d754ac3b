//! Cron dispatch of schedule rules. The table is rebuilt from scratch on every
//! rule change; a firing rule calls the launcher and never queues.

use crate::db::connection::DbPool;
use crate::models::schedule;
use crate::services::launcher::JobLauncher;
use chrono_tz::Tz;
use sitebackup_engine::schedule::ScheduleRule;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

struct Dispatch {
    scheduler: JobScheduler,
    registered: Vec<Uuid>,
}

pub struct BackupScheduler {
    dispatch: Mutex<Dispatch>,
    launcher: Arc<JobLauncher>,
    timezone: Tz,
}

impl BackupScheduler {
    pub async fn new(launcher: Arc<JobLauncher>, timezone: Tz) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            dispatch: Mutex::new(Dispatch {
                scheduler,
                registered: Vec::new(),
            }),
            launcher,
            timezone,
        })
    }

    /// Replace every registered rule with `rules`. Returns how many were registered.
    pub async fn rebuild(&self, rules: &[ScheduleRule]) -> anyhow::Result<usize> {
        let mut dispatch = self.dispatch.lock().await;

        for id in std::mem::take(&mut dispatch.registered) {
            if let Err(e) = dispatch.scheduler.remove(&id).await {
                tracing::warn!(job = %id, error = %e, "Failed to remove schedule");
            }
        }

        for rule in rules {
            let Some(cron) = rule.cron_expression() else {
                tracing::warn!(rule_id = rule.id, "Schedule has no days, not registered");
                continue;
            };
            let job = self.dispatch_job(rule, &cron)?;
            let id = dispatch.scheduler.add(job).await?;
            dispatch.registered.push(id);
            tracing::info!(rule_id = rule.id, method = %rule.method, cron = %cron, "Schedule registered");
        }

        Ok(dispatch.registered.len())
    }

    fn dispatch_job(&self, rule: &ScheduleRule, cron: &str) -> anyhow::Result<Job> {
        let launcher = self.launcher.clone();
        let method = rule.method;
        let rule_id = rule.id;

        let job = Job::new_async_tz(cron, self.timezone, move |_uuid, _lock| {
            let launcher = launcher.clone();
            Box::pin(async move {
                if launcher.start(method) {
                    tracing::info!(rule_id, method = %method, "Starting scheduled backup");
                } else {
                    tracing::warn!(rule_id, method = %method, "Skipping scheduled run: job already running");
                    launcher.engine().logs().append(format!(
                        "[{}] Scheduled run skipped: backup already running",
                        method.label()
                    ));
                }
            })
        })?;
        Ok(job)
    }

    /// Rebuild from the `schedules` table.
    pub async fn reload(&self, db: &DbPool) -> anyhow::Result<usize> {
        let db = db.clone();
        let rules = tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            schedule::find_all(&conn)
        })
        .await??;
        self.rebuild(&rules).await
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.dispatch.lock().await.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.dispatch.lock().await.scheduler.shutdown().await?;
        Ok(())
    }
}
