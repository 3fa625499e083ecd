mod memory;
mod postgres;

pub use memory::MemoryRollupRepository;
pub use postgres::PgRollupRepository;

use crate::error::Result;
use crate::models::{IntervalAggregate, RawReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Bulk access to the raw-reading and aggregate stores.
#[async_trait]
pub trait RollupRepository: Send + Sync {
    /// All readings for a system with `start_ms < t <= end_ms`, ordered by
    /// point, time and arrival.
    async fn fetch_interval_readings(
        &self,
        system_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawReading>>;

    /// Most recent non-null `last` per point from intervals ending at or
    /// before `before_or_at_ms`.
    async fn fetch_previous_last(
        &self,
        system_id: &str,
        point_ids: &[String],
        before_or_at_ms: i64,
    ) -> Result<HashMap<String, f64>>;

    /// Single upsert keyed by `(system_id, point_id, interval_end_ms)`,
    /// overwriting every value column.
    async fn upsert_aggregates(&self, rows: &[IntervalAggregate]) -> Result<()>;

    /// Readings for a system's point set within `(start_ms, end_ms]`.
    async fn fetch_window_readings(
        &self,
        system_id: &str,
        point_ids: &[String],
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawReading>>;

    async fn fetch_last_polls(&self, entities: &[String]) -> Result<HashMap<String, DateTime<Utc>>>;
}
