use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    executor::ScanExecutor,
    models::{JobStatus, ScanJob},
    store::{JobStore, StoreError},
};

/// What one pass of the worker loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Completed(i64),
    Failed(i64),
}

/// Long-lived consumer of the job queue.
///
/// Workers hold no job state between iterations: each pass claims a fresh
/// row from the store, so several workers (or processes) can share one
/// database.
#[derive(Clone)]
pub struct Worker {
    id: usize,
    store: JobStore,
    executor: ScanExecutor,
    poll_interval: Duration,
    wake: Arc<Notify>,
}

impl Worker {
    pub fn new(
        id: usize,
        store: JobStore,
        executor: ScanExecutor,
        poll_interval: Duration,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            store,
            executor,
            poll_interval,
            wake,
        }
    }

    /// Poll until `shutdown` fires. A scan in progress is always finished
    /// before the loop checks for shutdown again.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker = self.id, "scanner worker started");

        while !shutdown.is_cancelled() {
            let idle = match self.tick().await {
                Ok(Tick::Idle) => true,
                Ok(Tick::Completed(_) | Tick::Failed(_)) => false,
                Err(e) => {
                    error!(worker = self.id, error = %e, "job store error, retrying on next poll");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(worker = self.id, "scanner worker stopped");
    }

    /// Claim at most one queued job and drive it to a terminal status.
    pub async fn tick(&self) -> Result<Tick, StoreError> {
        let Some(job) = self.store.claim_next_queued().await? else {
            return Ok(Tick::Idle);
        };

        info!(
            worker = self.id,
            job_id = job.scan_id,
            targets = %job.targets,
            scan_type = %job.scan_type,
            "found job"
        );
        self.process(&job).await
    }

    async fn process(&self, job: &ScanJob) -> Result<Tick, StoreError> {
        let mut recorded = 0usize;

        for target in job.target_list() {
            match self
                .executor
                .execute(job.scan_id, target, job.scan_type)
                .await
            {
                Ok(findings) => {
                    for finding in &findings {
                        self.store.append_finding(finding).await?;
                    }
                    recorded += findings.len();
                }
                Err(e) => {
                    // Findings from earlier targets stay; the reason is only logged.
                    error!(
                        worker = self.id,
                        job_id = job.scan_id,
                        scan_target = target,
                        error = %e,
                        "scan failed"
                    );
                    self.store
                        .update_status(job.scan_id, JobStatus::Failed, Utc::now())
                        .await?;
                    return Ok(Tick::Failed(job.scan_id));
                }
            }
        }

        self.store
            .update_status(job.scan_id, JobStatus::Completed, Utc::now())
            .await?;
        info!(
            worker = self.id,
            job_id = job.scan_id,
            findings = recorded,
            "scan completed"
        );
        Ok(Tick::Completed(job.scan_id))
    }
}

/// Start `count` workers sharing one store, executor and wake-up signal.
pub fn spawn_workers(
    count: usize,
    store: JobStore,
    executor: ScanExecutor,
    poll_interval: Duration,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let worker = Worker::new(
                id,
                store.clone(),
                executor.clone(),
                poll_interval,
                wake.clone(),
            );
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
