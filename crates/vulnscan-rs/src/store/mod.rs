use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{split_targets, Finding, JobStatus, NewFinding, ScanJob, ScanType};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("scan {0} not found")]
    NotFound(i64),
    #[error("scan {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("a scan needs at least one target")]
    EmptyTargets,
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("job store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

const JOB_COLUMNS: &str = "scan_id, targets, scan_type, status, created_at, started_at, finished_at";
const FINDING_COLUMNS: &str =
    "finding_id, scan_id, title, severity, description, remediation_steps";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    scan_id: i64,
    targets: String,
    scan_type: String,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for ScanJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(ScanJob {
            scan_id: row.scan_id,
            targets: row.targets,
            scan_type: row
                .scan_type
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("scan {}: {e}", row.scan_id)))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("scan {}: {e}", row.scan_id)))?,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FindingRow {
    finding_id: i64,
    scan_id: i64,
    title: String,
    severity: String,
    description: String,
    remediation_steps: Option<String>,
}

impl TryFrom<FindingRow> for Finding {
    type Error = StoreError;

    fn try_from(row: FindingRow) -> Result<Self, Self::Error> {
        Ok(Finding {
            finding_id: row.finding_id,
            scan_id: row.scan_id,
            title: row.title,
            severity: row
                .severity
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("finding {}: {e}", row.finding_id)))?,
            description: row.description,
            remediation_steps: row.remediation_steps,
        })
    }
}

/// Durable record of scan jobs and their findings.
///
/// Every method goes straight to the database; nothing is cached between
/// calls, so any number of API handlers and workers (in this process or
/// another one sharing the file) observe the same state.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_job(
        &self,
        targets: &str,
        scan_type: ScanType,
    ) -> Result<ScanJob, StoreError> {
        let targets = targets.trim();
        if split_targets(targets).is_empty() {
            return Err(StoreError::EmptyTargets);
        }

        let sql = format!(
            "INSERT INTO scan_jobs(targets, scan_type, status, created_at) \
             VALUES(?, ?, 'Queued', ?) RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(targets)
            .bind(scan_type.as_str())
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        let job = ScanJob::try_from(row)?;
        debug!(job_id = job.scan_id, scan_type = %scan_type, "scan queued");
        Ok(job)
    }

    pub async fn get_job(&self, id: i64) -> Result<ScanJob, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM scan_jobs WHERE scan_id = ?");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?
            .try_into()
    }

    /// Newest first, optionally restricted to one status.
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<ScanJob>, StoreError> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM scan_jobs WHERE status = ? ORDER BY scan_id DESC"
                );
                sqlx::query_as::<_, JobRow>(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {JOB_COLUMNS} FROM scan_jobs ORDER BY scan_id DESC");
                sqlx::query_as::<_, JobRow>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(ScanJob::try_from).collect()
    }

    /// Findings of a scan in insertion order. An unknown scan yields an
    /// empty list; callers that care check the job first.
    pub async fn list_findings(&self, scan_id: i64) -> Result<Vec<Finding>, StoreError> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM findings WHERE scan_id = ? ORDER BY finding_id"
        );
        sqlx::query_as::<_, FindingRow>(&sql)
            .bind(scan_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Finding::try_from)
            .collect()
    }

    /// Move the oldest Queued job to Running and return it.
    ///
    /// A single conditional UPDATE, so two callers racing for the same row
    /// cannot both win: the loser's `status = 'Queued'` guard no longer
    /// matches and it moves on to the next job or gets `None`.
    pub async fn claim_next_queued(&self) -> Result<Option<ScanJob>, StoreError> {
        let sql = format!(
            "UPDATE scan_jobs SET status = 'Running', started_at = ? \
             WHERE scan_id = ( \
                 SELECT scan_id FROM scan_jobs WHERE status = 'Queued' \
                 ORDER BY scan_id LIMIT 1 \
             ) AND status = 'Queued' \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ScanJob::try_from).transpose()
    }

    /// Resolve a Running job into a terminal status, stamping `finished_at`.
    pub async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<ScanJob, StoreError> {
        if !JobStatus::Running.can_transition_to(status) {
            let current = self.get_job(id).await?;
            return Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to: status,
            });
        }

        let sql = format!(
            "UPDATE scan_jobs SET status = ?, finished_at = ? \
             WHERE scan_id = ? AND status = 'Running' \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(status.as_str())
            .bind(at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let current = self.get_job(id).await?;
                Err(StoreError::InvalidTransition {
                    id,
                    from: current.status,
                    to: status,
                })
            }
        }
    }

    pub async fn append_finding(&self, finding: &NewFinding) -> Result<Finding, StoreError> {
        let sql = format!(
            "INSERT INTO findings(scan_id, title, severity, description, remediation_steps) \
             VALUES(?, ?, ?, ?, ?) RETURNING {FINDING_COLUMNS}"
        );
        sqlx::query_as::<_, FindingRow>(&sql)
            .bind(finding.scan_id)
            .bind(&finding.title)
            .bind(finding.severity.as_str())
            .bind(&finding.description)
            .bind(&finding.remediation_steps)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }
}
