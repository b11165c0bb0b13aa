use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::ChangeDetectionConfig;
use crate::services::ChangeService;

const JOB_NAME: &str = "detect_directory_changes";

/// Runs the change monitor on a cron expression or a fixed interval.
pub struct Scheduler {
    changes: Arc<dyn ChangeService>,
    config: ChangeDetectionConfig,
    running: Arc<RwLock<bool>>,
}

async fn run_job(changes: &dyn ChangeService) {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = JOB_NAME, "Starting directory change poll");

    match changes.detect_changes().await {
        Ok(recorded) => info!(
            event = "job_finished",
            job_name = JOB_NAME,
            recorded,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Directory change poll finished"
        ),
        Err(e) => error!(
            event = "job_failed",
            job_name = JOB_NAME,
            error = %e,
            "Directory change poll failed"
        ),
    }
}

impl Scheduler {
    pub fn new(changes: Arc<dyn ChangeService>, config: ChangeDetectionConfig) -> Self {
        Self {
            changes,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Change monitor is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting change monitor");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let changes = Arc::clone(&self.changes);
        let running = Arc::clone(&self.running);
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let changes = Arc::clone(&changes);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_job(changes.as_ref()).await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;
        info!("Change monitor running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.interval_minutes.max(1);
        info!("Change monitor running: poll every {}m", interval_mins);

        let mut poll_interval = interval(Duration::from_secs(u64::from(interval_mins) * 60));

        loop {
            poll_interval.tick().await;
            if !*self.running.read().await {
                break;
            }
            run_job(self.changes.as_ref()).await;
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping change monitor...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One poll outside the schedule.
    pub async fn run_once(&self) -> Result<usize> {
        Ok(self.changes.detect_changes().await?)
    }
}
