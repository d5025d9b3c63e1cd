use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the `async_jobs` table and its indexes if they do not exist.
/// The row layout is the durable contract between producers, workers, and
/// status-polling clients, and must stay stable across restarts.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS async_jobs (
            id UUID PRIMARY KEY,
            user_id TEXT NOT NULL,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            progress INT NOT NULL DEFAULT 0,
            message TEXT,
            input_data JSONB,
            result_data JSONB,
            error_message TEXT,
            attempts INT NOT NULL DEFAULT 0,
            max_attempts INT NOT NULL DEFAULT 3,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Covers the claim scan (pending rows, oldest first).
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_async_jobs_claim ON async_jobs (status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_async_jobs_user ON async_jobs (user_id)")
        .execute(pool)
        .await?;

    info!("async_jobs schema ready");
    Ok(())
}
