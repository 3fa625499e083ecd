use crate::aggregation::{aggregate_interval, AggregationMode, IntervalBounds};
use crate::error::Result;
use crate::models::{IntervalAggregate, PointDescriptor};
use crate::repositories::RollupRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Rolls raw readings up into fixed-width interval aggregates.
///
/// Each interval costs one bulk read of readings, one read of counter
/// baselines (only when the system has counters) and one bulk upsert,
/// whatever the number of points.
#[derive(Clone)]
pub struct IntervalRollup {
    repository: Arc<dyn RollupRepository>,
    interval_length_ms: i64,
}

impl IntervalRollup {
    pub fn new(repository: Arc<dyn RollupRepository>, interval_minutes: u32) -> Self {
        Self {
            repository,
            interval_length_ms: interval_minutes.max(1) as i64 * 60_000,
        }
    }

    pub fn interval_length_ms(&self) -> i64 {
        self.interval_length_ms
    }

    /// Computes and persists the interval ending at `interval_end_ms`.
    /// Safe to repeat: identical inputs overwrite the same rows with identical values.
    pub async fn try_run_interval(
        &self,
        system_id: &str,
        points: &[PointDescriptor],
        interval_end_ms: i64,
    ) -> Result<Vec<IntervalAggregate>> {
        let interval = IntervalBounds::ending_at(interval_end_ms, self.interval_length_ms);
        let readings = self
            .repository
            .fetch_interval_readings(system_id, interval.start_ms, interval.end_ms)
            .await?;

        let counter_ids: Vec<String> = points
            .iter()
            .filter(|p| AggregationMode::resolve(p) == AggregationMode::DeltaCounter)
            .map(|p| p.id.clone())
            .collect();
        let previous_last = if counter_ids.is_empty() {
            HashMap::new()
        } else {
            self.repository
                .fetch_previous_last(system_id, &counter_ids, interval.start_ms)
                .await?
        };

        let rows = aggregate_interval(system_id, points, interval, &readings, &previous_last);
        self.repository.upsert_aggregates(&rows).await?;

        debug!(
            system_id = %system_id,
            interval_end_ms,
            readings = readings.len(),
            rows = rows.len(),
            "interval aggregated"
        );
        Ok(rows)
    }

    /// Like [`try_run_interval`](Self::try_run_interval) but never fails the
    /// caller: errors are logged and `None` is returned. Raw readings stay the
    /// source of truth, so a failed interval can be recomputed later.
    pub async fn run_interval(
        &self,
        system_id: &str,
        points: &[PointDescriptor],
        interval_end_ms: i64,
    ) -> Option<Vec<IntervalAggregate>> {
        match self.try_run_interval(system_id, points, interval_end_ms).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                error!(system_id = %system_id, interval_end_ms, "interval rollup failed: {e}");
                None
            }
        }
    }

    /// Recomputes every interval ending in `[from_end_ms, to_end_ms]`, oldest
    /// first so each counter baseline is refreshed before it is used.
    /// Returns how many intervals were written.
    pub async fn recompute_range(
        &self,
        system_id: &str,
        points: &[PointDescriptor],
        from_end_ms: i64,
        to_end_ms: i64,
    ) -> usize {
        let mut written = 0;
        let mut end = from_end_ms;
        while end <= to_end_ms {
            if self.run_interval(system_id, points, end).await.is_some() {
                written += 1;
            }
            end += self.interval_length_ms;
        }
        info!(system_id = %system_id, from_end_ms, to_end_ms, written, "recompute finished");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{MetricKind, RawReading};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct FailingRepository;

    #[async_trait]
    impl RollupRepository for FailingRepository {
        async fn fetch_interval_readings(&self, _: &str, _: i64, _: i64) -> Result<Vec<RawReading>> {
            Err(AppError::Config("store offline".into()))
        }

        async fn fetch_previous_last(&self, _: &str, _: &[String], _: i64) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }

        async fn upsert_aggregates(&self, _: &[IntervalAggregate]) -> Result<()> {
            Ok(())
        }

        async fn fetch_window_readings(&self, _: &str, _: &[String], _: i64, _: i64) -> Result<Vec<RawReading>> {
            Ok(Vec::new())
        }

        async fn fetch_last_polls(&self, _: &[String]) -> Result<HashMap<String, DateTime<Utc>>> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let rollup = IntervalRollup::new(Arc::new(FailingRepository), 5);
        let points = vec![PointDescriptor::new("p", false, MetricKind::Power)];

        assert!(rollup.try_run_interval("sys", &points, 300_000).await.is_err());
        assert!(rollup.run_interval("sys", &points, 300_000).await.is_none());
        assert_eq!(rollup.recompute_range("sys", &points, 300_000, 900_000).await, 0);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let rollup = IntervalRollup::new(Arc::new(FailingRepository), 0);
        assert_eq!(rollup.interval_length_ms(), 60_000);
    }
}
