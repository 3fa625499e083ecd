use crate::models::{IntervalAggregate, MetricKind, PointDescriptor, RawReading};
use std::collections::HashMap;
use tracing::debug;

/// How a point's readings are reduced, resolved once per point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Mean, extrema and last value.
    Plain,
    /// Lifetime counter: only `last` and the difference to the previous interval.
    DeltaCounter,
    /// Independent accumulated quantities: plain stats plus their sum as `delta`.
    EnergySum,
}

impl AggregationMode {
    pub fn resolve(point: &PointDescriptor) -> Self {
        if point.delta_counter {
            AggregationMode::DeltaCounter
        } else if point.metric == MetricKind::Energy {
            AggregationMode::EnergySum
        } else {
            AggregationMode::Plain
        }
    }
}

/// Half-open interval `(start_ms, end_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl IntervalBounds {
    pub fn ending_at(end_ms: i64, length_ms: i64) -> Self {
        Self {
            start_ms: end_ms - length_ms,
            end_ms,
        }
    }

    pub fn contains(&self, t_ms: i64) -> bool {
        self.start_ms < t_ms && t_ms <= self.end_ms
    }
}

/// Reduces one interval's raw readings into one row per declared point.
///
/// Every point gets a row, including points with no readings at all. Readings
/// for undeclared points or outside the interval are skipped.
pub fn aggregate_interval(
    system_id: &str,
    points: &[PointDescriptor],
    interval: IntervalBounds,
    readings: &[RawReading],
    previous_last: &HashMap<String, f64>,
) -> Vec<IntervalAggregate> {
    let mut by_point: HashMap<&str, Vec<&RawReading>> = points
        .iter()
        .map(|p| (p.id.as_str(), Vec::new()))
        .collect();

    let mut skipped = 0usize;
    for reading in readings {
        match by_point.get_mut(reading.point_id.as_str()) {
            Some(bucket) if interval.contains(reading.measurement_time_ms) => bucket.push(reading),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(system_id = %system_id, interval_end_ms = interval.end_ms, skipped, "ignored readings outside interval or for undeclared points");
    }

    points
        .iter()
        .map(|point| {
            let mut bucket = by_point.remove(point.id.as_str()).unwrap_or_default();
            // stable: equal timestamps keep arrival order
            bucket.sort_by_key(|r| r.measurement_time_ms);
            let mode = AggregationMode::resolve(point);
            let stats = reduce(mode, &bucket, previous_last.get(&point.id).copied());
            IntervalAggregate {
                system_id: system_id.to_string(),
                point_id: point.id.clone(),
                interval_end_ms: interval.end_ms,
                avg: stats.avg,
                min: stats.min,
                max: stats.max,
                last: stats.last,
                delta: stats.delta,
                sample_count: stats.sample_count,
                error_count: stats.error_count,
            }
        })
        .collect()
}

#[derive(Debug, Default, PartialEq)]
struct Stats {
    avg: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    last: Option<f64>,
    delta: Option<f64>,
    sample_count: i32,
    error_count: i32,
}

fn reduce(mode: AggregationMode, readings: &[&RawReading], previous_last: Option<f64>) -> Stats {
    // non-finite values count as errors alongside nulls
    let valid: Vec<f64> = readings
        .iter()
        .filter_map(|r| r.value)
        .filter(|v| v.is_finite())
        .collect();
    let sample_count = valid.len() as i32;
    let error_count = (readings.len() - valid.len()) as i32;

    let mut stats = Stats {
        sample_count,
        error_count,
        ..Stats::default()
    };
    let Some(&last) = valid.last() else {
        return stats;
    };
    stats.last = Some(last);

    if mode == AggregationMode::DeltaCounter {
        // no baseline on the first interval is "unknown", not zero
        stats.delta = previous_last.map(|prev| last - prev);
        return stats;
    }

    let sum: f64 = valid.iter().sum();
    stats.avg = Some(sum / valid.len() as f64);
    stats.min = valid.iter().copied().reduce(f64::min);
    stats.max = valid.iter().copied().reduce(f64::max);
    if mode == AggregationMode::EnergySum {
        stats.delta = Some(sum);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::Quality;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    const END: i64 = 1_700_000_100_000;
    const FIVE_MIN: i64 = 300_000;

    fn reading(point: &str, t: i64, value: Option<f64>) -> RawReading {
        RawReading {
            point_id: point.to_string(),
            measurement_time_ms: t,
            value,
            quality: Quality::Actual,
            session_id: Uuid::nil(),
        }
    }

    fn interval() -> IntervalBounds {
        IntervalBounds::ending_at(END, FIVE_MIN)
    }

    fn single(point: PointDescriptor, readings: &[RawReading], prev: &HashMap<String, f64>) -> IntervalAggregate {
        aggregate_interval("sys-1", &[point], interval(), readings, prev)
            .pop()
            .unwrap()
    }

    #[test]
    fn test_resolve_mode() {
        let counter = PointDescriptor::new("c", true, MetricKind::Energy);
        let energy = PointDescriptor::new("e", false, MetricKind::Energy);
        let power = PointDescriptor::new("p", false, MetricKind::Power);
        assert_eq!(AggregationMode::resolve(&counter), AggregationMode::DeltaCounter);
        assert_eq!(AggregationMode::resolve(&energy), AggregationMode::EnergySum);
        assert_eq!(AggregationMode::resolve(&power), AggregationMode::Plain);
    }

    #[test]
    fn test_plain_stats() {
        let readings = vec![
            reading("p", END - 200_000, Some(3.0)),
            reading("p", END - 100_000, Some(1.0)),
            reading("p", END - 250_000, Some(5.0)),
        ];
        let row = single(PointDescriptor::new("p", false, MetricKind::Power), &readings, &HashMap::new());
        assert_eq!(row.avg, Some(3.0));
        assert_eq!(row.min, Some(1.0));
        assert_eq!(row.max, Some(5.0));
        // chronologically last, not last in input order
        assert_eq!(row.last, Some(1.0));
        assert_eq!(row.delta, None);
        assert_eq!((row.sample_count, row.error_count), (3, 0));
    }

    #[test]
    fn test_last_ties_keep_arrival_order() {
        let readings = vec![
            reading("p", END - 1000, Some(7.0)),
            reading("p", END - 1000, Some(8.0)),
        ];
        let row = single(PointDescriptor::new("p", false, MetricKind::Price), &readings, &HashMap::new());
        assert_eq!(row.last, Some(8.0));
    }

    #[test]
    fn test_half_open_boundary() {
        let readings = vec![
            reading("p", END - FIVE_MIN, Some(100.0)),
            reading("p", END, Some(2.0)),
        ];
        let row = single(PointDescriptor::new("p", false, MetricKind::Power), &readings, &HashMap::new());
        assert_eq!(row.sample_count, 1);
        assert_eq!(row.last, Some(2.0));
        assert_eq!(row.max, Some(2.0));
    }

    #[test]
    fn test_delta_counter_with_baseline() {
        let readings = vec![
            reading("c", END - 200_000, Some(105.0)),
            reading("c", END - 10_000, Some(110.0)),
        ];
        let prev = HashMap::from([("c".to_string(), 100.0)]);
        let row = single(PointDescriptor::new("c", true, MetricKind::Energy), &readings, &prev);
        assert_eq!(row.delta, Some(10.0));
        assert_eq!((row.avg, row.min, row.max), (None, None, None));
        assert_eq!(row.last, Some(110.0));
    }

    #[test]
    fn test_delta_counter_without_baseline() {
        let readings = vec![
            reading("c", END - 200_000, Some(105.0)),
            reading("c", END - 10_000, Some(110.0)),
        ];
        let row = single(PointDescriptor::new("c", true, MetricKind::Energy), &readings, &HashMap::new());
        assert_eq!(row.delta, None);
        assert_eq!(row.last, Some(110.0));
        assert_eq!(row.sample_count, 2);
    }

    #[test]
    fn test_energy_sum() {
        let readings = vec![
            reading("e", END - 200_000, Some(1.0)),
            reading("e", END - 100_000, Some(2.0)),
            reading("e", END - 50_000, Some(1.5)),
        ];
        let row = single(PointDescriptor::new("e", false, MetricKind::Energy), &readings, &HashMap::new());
        assert_eq!(row.delta, Some(4.5));
        assert_eq!(row.avg, Some(1.5));
    }

    #[test]
    fn test_all_error_interval() {
        let readings = vec![
            reading("p", END - 200_000, None),
            reading("p", END - 100_000, None),
            reading("p", END - 50_000, None),
        ];
        let row = single(PointDescriptor::new("p", false, MetricKind::Power), &readings, &HashMap::new());
        assert_eq!((row.sample_count, row.error_count), (0, 3));
        assert_eq!(
            (row.avg, row.min, row.max, row.last, row.delta),
            (None, None, None, None, None)
        );
    }

    #[test]
    fn test_mixed_valid_and_error() {
        let readings = vec![
            reading("p", END - 200_000, Some(4.0)),
            reading("p", END - 100_000, None),
            reading("p", END - 50_000, Some(f64::NAN)),
            reading("p", END - 10_000, Some(f64::INFINITY)),
        ];
        let row = single(PointDescriptor::new("p", false, MetricKind::Power), &readings, &HashMap::new());
        assert_eq!((row.sample_count, row.error_count), (1, 3));
        assert_eq!(row.last, Some(4.0));
        assert_eq!(row.avg, Some(4.0));
    }

    #[test]
    fn test_every_point_gets_a_row() {
        let points = vec![
            PointDescriptor::new("a", false, MetricKind::Power),
            PointDescriptor::new("b", true, MetricKind::Energy),
        ];
        let readings = vec![
            reading("a", END - 1, Some(1.0)),
            reading("zzz", END - 1, Some(9.0)),
        ];
        let rows = aggregate_interval("sys-1", &points, interval(), &readings, &HashMap::new());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].point_id, "b");
        assert_eq!((rows[1].sample_count, rows[1].error_count), (0, 0));
        assert_eq!(rows[1].interval_end_ms, END);
    }

    #[test]
    fn test_idempotent() {
        let points = vec![
            PointDescriptor::new("a", false, MetricKind::Power),
            PointDescriptor::new("b", false, MetricKind::Energy),
        ];
        let readings: Vec<RawReading> = (0..50)
            .map(|i| reading(if i % 2 == 0 { "a" } else { "b" }, END - i * 5000, Some(0.1 * i as f64)))
            .collect();
        let first = aggregate_interval("sys-1", &points, interval(), &readings, &HashMap::new());
        let second = aggregate_interval("sys-1", &points, interval(), &readings, &HashMap::new());
        assert_eq!(first, second);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.avg.map(f64::to_bits), b.avg.map(f64::to_bits));
            assert_eq!(a.delta.map(f64::to_bits), b.delta.map(f64::to_bits));
        }
    }
}
