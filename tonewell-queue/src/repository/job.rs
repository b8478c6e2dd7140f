//! Job Repository
//!
//! Handles all database operations on the `recording_jobs` table.

use sqlx::PgPool;
use tonewell_core::domain::{JobRecord, JobStatus, Owner};
use uuid::Uuid;

use crate::error::QueueError;

const COLUMNS: &str = "id, status, priority, retries, owner, device, input_ref, \
                       input_name, input_duration, created_at, updated_at";

/// Insert a new job
pub async fn insert(pool: &PgPool, job: &JobRecord) -> Result<(), QueueError> {
    sqlx::query(
        r#"
        INSERT INTO recording_jobs
            (id, status, priority, retries, owner, device, input_ref,
             input_name, input_duration, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(job.id)
    .bind(job.status.as_str())
    .bind(job.priority)
    .bind(to_i32(job.retries, "retries")?)
    .bind(job.owner.to_blob())
    .bind(&job.device)
    .bind(&job.input_ref)
    .bind(&job.input_name)
    .bind(to_i32(job.input_duration, "input_duration")?)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set the status of a job and reset its retry counter
///
/// Returns false if no such job exists.
pub async fn set_status(pool: &PgPool, id: Uuid, status: JobStatus) -> Result<bool, QueueError> {
    let result = sqlx::query(
        r#"
        UPDATE recording_jobs
        SET status = $1, retries = 0, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(status.as_str())
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Bump the retry counter of a job, leaving its status alone
///
/// Returns false if no such job exists.
pub async fn increment_retries(pool: &PgPool, id: Uuid) -> Result<bool, QueueError> {
    let result = sqlx::query(
        r#"
        UPDATE recording_jobs
        SET retries = retries + 1, updated_at = $1
        WHERE id = $2
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Total playing time of jobs on `device` that still have to be recorded
pub async fn waiting_seconds(pool: &PgPool, device: &str) -> Result<u64, QueueError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(input_duration), 0)::BIGINT
        FROM recording_jobs
        WHERE device = $1 AND status IN ('new', 'recording')
        "#,
    )
    .bind(device)
    .fetch_one(pool)
    .await?;

    Ok(u64::try_from(total).unwrap_or(0))
}

/// Oldest live job on `device`
pub async fn find_front(pool: &PgPool, device: &str) -> Result<Option<JobRecord>, QueueError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM recording_jobs
        WHERE device = $1 AND status NOT IN ('done', 'failed')
        ORDER BY created_at ASC, seq ASC
        LIMIT 1
        "#
    ))
    .bind(device)
    .fetch_optional(pool)
    .await?;

    row.map(JobRecord::try_from).transpose()
}

/// Find a job by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<JobRecord>, QueueError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {COLUMNS} FROM recording_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(JobRecord::try_from).transpose()
}

/// Every job ever queued on `device`, oldest first
pub async fn find_by_device(pool: &PgPool, device: &str) -> Result<Vec<JobRecord>, QueueError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM recording_jobs
        WHERE device = $1
        ORDER BY created_at ASC, seq ASC
        "#
    ))
    .bind(device)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobRecord::try_from).collect()
}

fn to_i32(value: u32, field: &str) -> Result<i32, QueueError> {
    i32::try_from(value).map_err(|_| QueueError::InvalidRecord(format!("{field} out of range")))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    priority: i32,
    retries: i32,
    owner: serde_json::Value,
    device: String,
    input_ref: String,
    input_name: String,
    input_duration: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| QueueError::Corrupt { id, reason };

        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let owner = Owner::from_blob(&row.owner).map_err(|e| corrupt(e.to_string()))?;
        let retries = u32::try_from(row.retries)
            .map_err(|_| corrupt(format!("negative retries {}", row.retries)))?;
        let input_duration = u32::try_from(row.input_duration)
            .map_err(|_| corrupt(format!("negative duration {}", row.input_duration)))?;

        Ok(JobRecord {
            id,
            status,
            priority: row.priority,
            retries,
            device: row.device,
            owner,
            input_ref: row.input_ref,
            input_name: row.input_name,
            input_duration,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
