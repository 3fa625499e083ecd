use super::RollupRepository;
use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::models::{IntervalAggregate, RawReading};
use crate::quality::Quality;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{postgres::PgRow, Row};
use std::collections::HashMap;

const AGGREGATE_COLUMNS: [&str; 10] = [
    "system_id",
    "point_id",
    "interval_end",
    "avg",
    "min",
    "max",
    "last",
    "delta",
    "sample_count",
    "error_count",
];
const AGGREGATE_KEY: [&str; 3] = ["system_id", "point_id", "interval_end"];

#[derive(Clone)]
pub struct PgRollupRepository {
    pool: DbPool,
}

impl PgRollupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_ts(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Time(format!("timestamp {}ms out of range", ms)))
}

/// Bounds for `ts >= lower AND ts < upper` selecting rows whose truncated
/// millisecond timestamp lies in `(start_ms, end_ms]`. Stored times carry
/// microseconds.
fn millis_bounds(start_ms: i64, end_ms: i64) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    Ok((to_ts(start_ms + 1)?, to_ts(end_ms + 1)?))
}

fn reading_from_row(row: &PgRow) -> Result<RawReading> {
    let ts: DateTime<Utc> = row.try_get("ts")?;
    let quality: String = row.try_get("quality")?;
    Ok(RawReading {
        point_id: row.try_get("point_id")?,
        measurement_time_ms: ts.timestamp_millis(),
        value: row.try_get("value")?,
        quality: quality.parse::<Quality>()?,
        session_id: row.try_get("session_id")?,
    })
}

/// `INSERT ... VALUES ... ON CONFLICT (key) DO UPDATE SET` for every row in one statement.
fn upsert_sql(row_count: usize) -> String {
    let cols_per_row = AGGREGATE_COLUMNS.len();
    let values: Vec<String> = (0..row_count)
        .map(|row| {
            let tuple: Vec<String> = (1..=cols_per_row)
                .map(|col| format!("${}", row * cols_per_row + col))
                .collect();
            format!("({})", tuple.join(", "))
        })
        .collect();
    let update_cols: Vec<String> = AGGREGATE_COLUMNS
        .iter()
        .filter(|col| !AGGREGATE_KEY.contains(*col))
        .map(|col| format!("{} = EXCLUDED.{}", col, col))
        .collect();
    format!(
        "INSERT INTO interval_aggregates ({}) VALUES {} ON CONFLICT ({}) DO UPDATE SET {}",
        AGGREGATE_COLUMNS.join(", "),
        values.join(", "),
        AGGREGATE_KEY.join(", "),
        update_cols.join(", ")
    )
}

#[async_trait]
impl RollupRepository for PgRollupRepository {
    async fn fetch_interval_readings(
        &self,
        system_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawReading>> {
        let (lower, upper) = millis_bounds(start_ms, end_ms)?;
        let rows = sqlx::query(
            r#"
            SELECT point_id, ts, value, quality, session_id
            FROM raw_readings
            WHERE system_id = $1 AND ts >= $2 AND ts < $3
            ORDER BY point_id, ts, id
            "#,
        )
        .bind(system_id)
        .bind(lower)
        .bind(upper)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reading_from_row).collect()
    }

    async fn fetch_previous_last(
        &self,
        system_id: &str,
        point_ids: &[String],
        before_or_at_ms: i64,
    ) -> Result<HashMap<String, f64>> {
        if point_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (point_id) point_id, last
            FROM interval_aggregates
            WHERE system_id = $1
              AND point_id = ANY($2)
              AND interval_end <= $3
              AND last IS NOT NULL
            ORDER BY point_id, interval_end DESC
            "#,
        )
        .bind(system_id)
        .bind(point_ids)
        .bind(to_ts(before_or_at_ms)?)
        .fetch_all(&self.pool)
        .await?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            found.insert(row.try_get::<String, _>("point_id")?, row.try_get::<f64, _>("last")?);
        }
        Ok(found)
    }

    async fn upsert_aggregates(&self, rows: &[IntervalAggregate]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = upsert_sql(rows.len());
        let mut q = sqlx::query(&sql);
        for r in rows {
            q = q
                .bind(&r.system_id)
                .bind(&r.point_id)
                .bind(to_ts(r.interval_end_ms)?)
                .bind(r.avg)
                .bind(r.min)
                .bind(r.max)
                .bind(r.last)
                .bind(r.delta)
                .bind(r.sample_count)
                .bind(r.error_count);
        }
        q.execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_window_readings(
        &self,
        system_id: &str,
        point_ids: &[String],
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawReading>> {
        if point_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (lower, upper) = millis_bounds(start_ms, end_ms)?;
        let rows = sqlx::query(
            r#"
            SELECT point_id, ts, value, quality, session_id
            FROM raw_readings
            WHERE system_id = $1 AND point_id = ANY($2) AND ts >= $3 AND ts < $4
            ORDER BY point_id, ts, id
            "#,
        )
        .bind(system_id)
        .bind(point_ids)
        .bind(lower)
        .bind(upper)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reading_from_row).collect()
    }

    async fn fetch_last_polls(&self, entities: &[String]) -> Result<HashMap<String, DateTime<Utc>>> {
        if entities.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT entity, last_success
            FROM poll_status
            WHERE entity = ANY($1) AND last_success IS NOT NULL
            "#,
        )
        .bind(entities)
        .fetch_all(&self.pool)
        .await?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            found.insert(
                row.try_get::<String, _>("entity")?,
                row.try_get::<DateTime<Utc>, _>("last_success")?,
            );
        }
        Ok(found)
    }
}
