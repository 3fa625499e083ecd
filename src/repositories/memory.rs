use super::RollupRepository;
use crate::error::Result;
use crate::models::{IntervalAggregate, RawReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

type AggregateKey = (String, String, i64);

/// In-process store backed by plain collections, for fixtures and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRollupRepository {
    readings: Mutex<Vec<(String, RawReading)>>,
    aggregates: Mutex<BTreeMap<AggregateKey, IntervalAggregate>>,
    last_polls: Mutex<HashMap<String, DateTime<Utc>>>,
    upsert_calls: Mutex<usize>,
}

impl MemoryRollupRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends readings in arrival order.
    pub fn insert_readings(&self, system_id: &str, readings: impl IntoIterator<Item = RawReading>) {
        let mut stored = self.readings.lock().unwrap_or_else(|e| e.into_inner());
        stored.extend(readings.into_iter().map(|r| (system_id.to_string(), r)));
    }

    pub fn record_poll(&self, entity: &str, at: DateTime<Utc>) {
        self.last_polls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity.to_string(), at);
    }

    pub fn aggregates(&self) -> Vec<IntervalAggregate> {
        self.aggregates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn aggregate(&self, system_id: &str, point_id: &str, interval_end_ms: i64) -> Option<IntervalAggregate> {
        self.aggregates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(system_id.to_string(), point_id.to_string(), interval_end_ms))
            .cloned()
    }

    pub fn upsert_calls(&self) -> usize {
        *self.upsert_calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn select(&self, keep: impl Fn(&str, &RawReading) -> bool) -> Vec<RawReading> {
        let stored = self.readings.lock().unwrap_or_else(|e| e.into_inner());
        let mut selected: Vec<(usize, RawReading)> = stored
            .iter()
            .enumerate()
            .filter(|(_, (system, r))| keep(system, r))
            .map(|(arrival, (_, r))| (arrival, r.clone()))
            .collect();
        selected.sort_by(|(a_arrival, a), (b_arrival, b)| {
            (&a.point_id, a.measurement_time_ms, a_arrival).cmp(&(&b.point_id, b.measurement_time_ms, b_arrival))
        });
        selected.into_iter().map(|(_, r)| r).collect()
    }
}

#[async_trait]
impl RollupRepository for MemoryRollupRepository {
    async fn fetch_interval_readings(
        &self,
        system_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawReading>> {
        Ok(self.select(|system, r| {
            system == system_id && start_ms < r.measurement_time_ms && r.measurement_time_ms <= end_ms
        }))
    }

    async fn fetch_previous_last(
        &self,
        system_id: &str,
        point_ids: &[String],
        before_or_at_ms: i64,
    ) -> Result<HashMap<String, f64>> {
        let aggregates = self.aggregates.lock().unwrap_or_else(|e| e.into_inner());
        let mut found = HashMap::new();
        // keys iterate in interval order, so later intervals overwrite earlier ones
        for ((system, point, end), row) in aggregates.iter() {
            if system != system_id || *end > before_or_at_ms || !point_ids.contains(point) {
                continue;
            }
            if let Some(last) = row.last {
                found.insert(point.clone(), last);
            }
        }
        Ok(found)
    }

    async fn upsert_aggregates(&self, rows: &[IntervalAggregate]) -> Result<()> {
        let mut aggregates = self.aggregates.lock().unwrap_or_else(|e| e.into_inner());
        for row in rows {
            aggregates.insert(
                (row.system_id.clone(), row.point_id.clone(), row.interval_end_ms),
                row.clone(),
            );
        }
        *self.upsert_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    async fn fetch_window_readings(
        &self,
        system_id: &str,
        point_ids: &[String],
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawReading>> {
        Ok(self.select(|system, r| {
            system == system_id
                && point_ids.contains(&r.point_id)
                && start_ms < r.measurement_time_ms
                && r.measurement_time_ms <= end_ms
        }))
    }

    async fn fetch_last_polls(&self, entities: &[String]) -> Result<HashMap<String, DateTime<Utc>>> {
        let polls = self.last_polls.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entities
            .iter()
            .filter_map(|e| polls.get(e).map(|at| (e.clone(), *at)))
            .collect())
    }
}
