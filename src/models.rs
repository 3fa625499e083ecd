use crate::quality::Quality;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observation as deposited by an ingestion adapter. `value` is `None`
/// when the adapter recorded an error instead of a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub point_id: String,
    pub measurement_time_ms: i64,
    pub value: Option<f64>,
    pub quality: Quality,
    pub session_id: Uuid,
}

/// Fixed-width rollup row, keyed by `(system_id, point_id, interval_end_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalAggregate {
    pub system_id: String,
    pub point_id: String,
    pub interval_end_ms: i64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub last: Option<f64>,
    pub delta: Option<f64>,
    pub sample_count: i32,
    pub error_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Power,
    Energy,
    Price,
    #[default]
    Other,
}

/// Read-only description of a telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDescriptor {
    pub id: String,
    /// Raw values are a monotonically increasing lifetime total.
    #[serde(default)]
    pub delta_counter: bool,
    #[serde(default)]
    pub metric: MetricKind,
}

impl PointDescriptor {
    pub fn new(id: impl Into<String>, delta_counter: bool, metric: MetricKind) -> Self {
        Self {
            id: id.into(),
            delta_counter,
            metric,
        }
    }
}
