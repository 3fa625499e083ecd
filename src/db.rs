use crate::error::AppError;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

pub type DbPool = Pool<Postgres>;

pub async fn connect(url: &str, max_connections: u32) -> Result<DbPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Creates the reading, aggregate and poll-status tables if they are missing.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), AppError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_readings
        (
            id          BIGSERIAL         PRIMARY KEY,
            system_id   TEXT              NOT NULL,
            point_id    TEXT              NOT NULL,
            ts          TIMESTAMPTZ       NOT NULL,
            value       DOUBLE PRECISION,
            quality     TEXT              NOT NULL,
            session_id  UUID              NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS raw_readings_system_ts_idx ON raw_readings (system_id, ts)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS raw_readings_point_ts_idx ON raw_readings (point_id, ts)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interval_aggregates
        (
            system_id     TEXT              NOT NULL,
            point_id      TEXT              NOT NULL,
            interval_end  TIMESTAMPTZ       NOT NULL,
            avg           DOUBLE PRECISION,
            min           DOUBLE PRECISION,
            max           DOUBLE PRECISION,
            last          DOUBLE PRECISION,
            delta         DOUBLE PRECISION,
            sample_count  INTEGER           NOT NULL,
            error_count   INTEGER           NOT NULL,
            PRIMARY KEY (system_id, point_id, interval_end)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS poll_status
        (
            entity        TEXT              PRIMARY KEY,
            last_success  TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
