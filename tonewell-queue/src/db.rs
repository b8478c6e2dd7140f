use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Channel every insert is announced on; the payload is the job's device
pub const WAKE_CHANNEL: &str = "recording_jobs";

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recording_jobs (
            id UUID PRIMARY KEY,
            seq BIGSERIAL NOT NULL,
            status VARCHAR(16) NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            retries INTEGER NOT NULL DEFAULT 0,
            owner JSONB NOT NULL,
            device VARCHAR(64) NOT NULL,
            input_ref VARCHAR(255) NOT NULL,
            input_name VARCHAR(80) NOT NULL,
            input_duration INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Partition FIFO lookups
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recording_jobs_device_created \
         ON recording_jobs(device, created_at, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION notify_recording_job() RETURNS trigger AS $$
        BEGIN
            PERFORM pg_notify('recording_jobs', NEW.device);
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("DROP TRIGGER IF EXISTS recording_jobs_notify ON recording_jobs")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER recording_jobs_notify
            AFTER INSERT ON recording_jobs
            FOR EACH ROW EXECUTE FUNCTION notify_recording_job()
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
