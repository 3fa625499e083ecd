//! Quality characterisation of a multi-day window.
//!
//! Readings for a set of related points are folded into a sparse
//! `(period, point) -> quality` matrix. From it we render a per-point
//! overview string, run-length encode the timeline into `QualityRange`s, and
//! reduce the whole matrix to a single completeness label.

use crate::error::{AppError, Result};
use crate::quality::{Quality, QualityAlphabet};
use crate::window::Window;
use serde::{Serialize, Serializer};
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

/// Quality of one period across all points that reported in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodQuality {
    Missing,
    Uniform(Quality),
    /// Present points disagree.
    Mixed,
}

impl PeriodQuality {
    pub fn code(&self, alphabet: &QualityAlphabet) -> char {
        match self {
            PeriodQuality::Missing => alphabet.absent,
            PeriodQuality::Uniform(q) => alphabet.code(*q),
            PeriodQuality::Mixed => alphabet.mixed,
        }
    }
}

impl fmt::Display for PeriodQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodQuality::Missing => f.write_str("missing"),
            PeriodQuality::Uniform(q) => write!(f, "{}", q),
            PeriodQuality::Mixed => f.write_str("mixed"),
        }
    }
}

impl Serialize for PeriodQuality {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Contiguous periods sharing one quality and one set of reporting points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityRange {
    pub quality: PeriodQuality,
    pub point_ids_present: BTreeSet<String>,
    pub range_start_ms: i64,
    pub range_end_ms: i64,
    pub num_periods: usize,
}

/// Single label summarising the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    NoData,
    /// Some (period, point) cells have no data.
    Incomplete,
    /// Every cell present with the same quality.
    All(Quality),
    /// Every cell present, qualities differ.
    Mixed,
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completeness::NoData => f.write_str("no-data"),
            Completeness::Incomplete => f.write_str("incomplete"),
            Completeness::All(q) => write!(f, "all-{}", q),
            Completeness::Mixed => f.write_str("mixed"),
        }
    }
}

impl Serialize for Completeness {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    quality: Quality,
    measurement_time_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacterisationReport {
    pub window: Window,
    pub overview: BTreeMap<String, String>,
    pub ranges: Vec<QualityRange>,
    pub completeness: Completeness,
}

/// Accumulates readings for one window. Owned by a single computation.
#[derive(Debug)]
pub struct QualityCharacteriser {
    window: Window,
    alphabet: QualityAlphabet,
    point_keys: Vec<String>,
    point_index: HashMap<String, usize>,
    cells: BTreeMap<(usize, usize), Cell>,
    quality_counts: BTreeMap<Quality, usize>,
}

impl QualityCharacteriser {
    /// `point_keys` are the points expected to report; a window where one of
    /// them never reports is incomplete.
    pub fn new<I, S>(window: Window, alphabet: QualityAlphabet, point_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut characteriser = Self {
            window,
            alphabet,
            point_keys: Vec::new(),
            point_index: HashMap::new(),
            cells: BTreeMap::new(),
            quality_counts: BTreeMap::new(),
        };
        for key in point_keys {
            characteriser.intern(key.into());
        }
        characteriser
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn intern(&mut self, key: String) -> usize {
        if let Some(&idx) = self.point_index.get(&key) {
            return idx;
        }
        let idx = self.point_keys.len();
        self.point_index.insert(key.clone(), idx);
        self.point_keys.push(key);
        idx
    }

    /// Records the quality observed for a point at `measurement_time_ms`.
    ///
    /// Fails when the time is outside `(window start, window end]`. A later
    /// reading in the same period replaces the earlier one; no ordering of
    /// quality upgrades is enforced.
    pub fn add_reading(&mut self, point_key: &str, measurement_time_ms: i64, quality: Quality) -> Result<()> {
        let period = self
            .window
            .period_index(measurement_time_ms)
            .ok_or_else(|| AppError::OutsideRange {
                point: point_key.to_string(),
                measurement_time_ms,
                window_start_ms: self.window.start_ms(),
                window_end_ms: self.window.end_ms(),
            })?;
        let point = self.intern(point_key.to_string());
        let cell = Cell {
            quality,
            measurement_time_ms,
        };

        match self.cells.entry((period, point)) {
            Entry::Vacant(slot) => {
                slot.insert(cell);
                *self.quality_counts.entry(quality).or_default() += 1;
            }
            Entry::Occupied(mut slot) => {
                let previous = *slot.get();
                if measurement_time_ms < previous.measurement_time_ms {
                    return Ok(());
                }
                slot.insert(cell);
                if previous.quality != quality {
                    debug!(point = %point_key, period, from = %previous.quality, to = %quality, "cell quality changed");
                    decrement(&mut self.quality_counts, previous.quality);
                    *self.quality_counts.entry(quality).or_default() += 1;
                }
            }
        }
        Ok(())
    }

    /// One code per period for a single point. Unknown points render as all absent.
    pub fn overview(&self, point_key: &str) -> String {
        let Some(&point) = self.point_index.get(point_key) else {
            return std::iter::repeat(self.alphabet.absent)
                .take(self.window.num_periods)
                .collect();
        };
        (0..self.window.num_periods)
            .map(|period| match self.cells.get(&(period, point)) {
                Some(cell) => self.alphabet.code(cell.quality),
                None => self.alphabet.absent,
            })
            .collect()
    }

    /// One code per period across all points; disagreeing points show the mixed symbol.
    pub fn combined_overview(&self) -> String {
        self.period_qualities()
            .into_iter()
            .map(|(quality, _)| quality.code(&self.alphabet))
            .collect()
    }

    /// Run-length encodes `(period quality, reporting point set)` across periods.
    pub fn characterisation(&self) -> Vec<QualityRange> {
        let mut ranges: Vec<QualityRange> = Vec::new();
        for (period, (quality, present)) in self.period_qualities().into_iter().enumerate() {
            match ranges.last_mut() {
                Some(last) if last.quality == quality && last.point_ids_present == present => {
                    last.num_periods += 1;
                    last.range_end_ms = self.window.period_end_ms(period);
                }
                _ => ranges.push(QualityRange {
                    quality,
                    point_ids_present: present,
                    range_start_ms: self.window.period_start_ms(period),
                    range_end_ms: self.window.period_end_ms(period),
                    num_periods: 1,
                }),
            }
        }
        ranges
    }

    /// Constant time: derived from running per-quality cell counts.
    pub fn completeness(&self) -> Completeness {
        let present: usize = self.quality_counts.values().sum();
        let total = self.window.num_periods * self.point_keys.len();
        if present == 0 {
            return Completeness::NoData;
        }
        if present < total {
            return Completeness::Incomplete;
        }
        let mut qualities = self.quality_counts.iter().filter(|(_, n)| **n > 0);
        match (qualities.next(), qualities.next()) {
            (Some((quality, _)), None) => Completeness::All(*quality),
            _ => Completeness::Mixed,
        }
    }

    pub fn report(&self) -> CharacterisationReport {
        CharacterisationReport {
            window: self.window,
            overview: self
                .point_keys
                .iter()
                .map(|key| (key.clone(), self.overview(key)))
                .collect(),
            ranges: self.characterisation(),
            completeness: self.completeness(),
        }
    }

    fn period_qualities(&self) -> Vec<(PeriodQuality, BTreeSet<String>)> {
        let mut cells = self.cells.iter().peekable();
        (0..self.window.num_periods)
            .map(|period| {
                let mut present = BTreeSet::new();
                let mut quality = PeriodQuality::Missing;
                while let Some((&(_, point), cell)) = cells.next_if(|((p, _), _)| *p == period) {
                    present.insert(self.point_keys[point].clone());
                    quality = match quality {
                        PeriodQuality::Missing => PeriodQuality::Uniform(cell.quality),
                        PeriodQuality::Uniform(q) if q == cell.quality => quality,
                        _ => PeriodQuality::Mixed,
                    };
                }
                (quality, present)
            })
            .collect()
    }
}

fn decrement(counts: &mut BTreeMap<Quality, usize>, quality: Quality) {
    if let Some(n) = counts.get_mut(&quality) {
        *n = n.saturating_sub(1);
        if *n == 0 {
            counts.remove(&quality);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HALF_HOUR: i64 = 30 * 60_000;
    const DAY_START: i64 = 1_714_485_600_000;

    fn day_window(days: usize) -> Window {
        Window::new(DAY_START, 48 * days, HALF_HOUR).unwrap()
    }

    fn at(period: usize) -> i64 {
        DAY_START + (period as i64 + 1) * HALF_HOUR
    }

    fn characteriser(points: &[&str], days: usize) -> QualityCharacteriser {
        QualityCharacteriser::new(day_window(days), QualityAlphabet::default(), points.iter().copied())
    }

    #[test]
    fn test_boundary_rejection() {
        let mut c = characteriser(&["p1"], 1);
        let err = c
            .add_reading("p1", DAY_START - HALF_HOUR, Quality::Actual)
            .unwrap_err();
        assert!(err.to_string().contains("outside range boundaries"));
        assert!(c.add_reading("p1", DAY_START, Quality::Actual).is_err());
        assert!(c.add_reading("p1", DAY_START + 48 * HALF_HOUR, Quality::Actual).is_ok());
        assert!(c.add_reading("p1", DAY_START + 48 * HALF_HOUR + 1, Quality::Actual).is_err());
    }

    #[test]
    fn test_run_length_compression() {
        let mut c = characteriser(&["p1"], 2);
        for period in 0..48 {
            c.add_reading("p1", at(period), Quality::Actual).unwrap();
        }
        for period in 48..96 {
            c.add_reading("p1", at(period), Quality::Forecast).unwrap();
        }

        let ranges = c.characterisation();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].quality, PeriodQuality::Uniform(Quality::Actual));
        assert_eq!(ranges[0].num_periods, 48);
        assert_eq!(ranges[0].range_start_ms, DAY_START);
        assert_eq!(ranges[0].range_end_ms, DAY_START + 48 * HALF_HOUR);
        assert_eq!(ranges[1].quality, PeriodQuality::Uniform(Quality::Forecast));
        assert_eq!(ranges[1].num_periods, 48);
        assert_eq!(ranges[1].range_start_ms, ranges[0].range_end_ms);

        let expected = format!("{}{}", "a".repeat(48), "f".repeat(48));
        assert_eq!(c.overview("p1"), expected);
        assert_eq!(c.completeness(), Completeness::Mixed);
    }

    #[test]
    fn test_partial_coverage_splits_range() {
        let mut c = characteriser(&["p1", "p2"], 1);
        for period in 0..48 {
            c.add_reading("p1", at(period), Quality::Actual).unwrap();
            if period < 20 {
                c.add_reading("p2", at(period), Quality::Actual).unwrap();
            }
        }

        let ranges = c.characterisation();
        assert_eq!(ranges.len(), 2);
        assert_eq!(
            ranges[0].point_ids_present,
            BTreeSet::from(["p1".to_string(), "p2".to_string()])
        );
        assert_eq!(ranges[0].num_periods, 20);
        assert_eq!(ranges[1].point_ids_present, BTreeSet::from(["p1".to_string()]));
        assert_eq!(ranges[1].num_periods, 28);
        assert_eq!(ranges[1].range_start_ms, DAY_START + 20 * HALF_HOUR);
        assert_eq!(c.completeness(), Completeness::Incomplete);
    }

    #[test]
    fn test_gaps_and_mixed_periods() {
        let mut c = characteriser(&["p1", "p2"], 1);
        c.add_reading("p1", at(0), Quality::Actual).unwrap();
        c.add_reading("p2", at(0), Quality::Forecast).unwrap();
        c.add_reading("p1", at(2), Quality::Actual).unwrap();

        let ranges = c.characterisation();
        let qualities: Vec<PeriodQuality> = ranges.iter().map(|r| r.quality).collect();
        assert_eq!(
            qualities,
            vec![
                PeriodQuality::Mixed,
                PeriodQuality::Missing,
                PeriodQuality::Uniform(Quality::Actual),
                PeriodQuality::Missing,
            ]
        );
        assert!(ranges[1].point_ids_present.is_empty());
        assert_eq!(ranges[3].num_periods, 45);
        assert_eq!(&c.combined_overview()[..4], "*.a.");
        assert_eq!(&c.overview("p2")[..3], "f..");
    }

    #[test]
    fn test_overview_for_unknown_point() {
        let c = characteriser(&["p1"], 1);
        assert_eq!(c.overview("nope"), ".".repeat(48));
    }

    #[test]
    fn test_completeness_labels() {
        let mut c = characteriser(&["p1", "p2"], 1);
        assert_eq!(c.completeness(), Completeness::NoData);
        assert_eq!(c.completeness().to_string(), "no-data");

        for period in 0..48 {
            c.add_reading("p1", at(period), Quality::Billable).unwrap();
            c.add_reading("p2", at(period), Quality::Billable).unwrap();
        }
        assert_eq!(c.completeness(), Completeness::All(Quality::Billable));
        assert_eq!(c.completeness().to_string(), "all-billable");

        c.add_reading("p3", at(0), Quality::Billable).unwrap();
        assert_eq!(c.completeness(), Completeness::Incomplete);
    }

    #[test]
    fn test_all_forecast() {
        let mut c = characteriser(&["p1"], 1);
        for period in 0..48 {
            c.add_reading("p1", at(period), Quality::Forecast).unwrap();
        }
        assert_eq!(c.completeness().to_string(), "all-forecast");
    }

    #[test]
    fn test_latest_observation_wins() {
        let mut c = characteriser(&["p1"], 1);
        for period in 0..48 {
            c.add_reading("p1", at(period), Quality::Forecast).unwrap();
        }
        // upgrade to billable for the whole day, then a stale forecast arrives
        for period in 0..48 {
            c.add_reading("p1", at(period), Quality::Billable).unwrap();
        }
        c.add_reading("p1", at(5) - 60_000, Quality::Forecast).unwrap();

        assert_eq!(c.overview("p1"), "b".repeat(48));
        assert_eq!(c.completeness(), Completeness::All(Quality::Billable));
        assert_eq!(c.characterisation().len(), 1);
    }

    #[test]
    fn test_downgrade_is_not_rejected() {
        let mut c = characteriser(&["p1"], 1);
        c.add_reading("p1", at(0), Quality::Billable).unwrap();
        c.add_reading("p1", at(0), Quality::Estimated).unwrap();
        assert_eq!(&c.overview("p1")[..1], "e");
    }

    #[test]
    fn test_report_serialises() {
        let mut c = characteriser(&["p1"], 1);
        c.add_reading("p1", at(0), Quality::Actual).unwrap();
        let json = serde_json::to_value(c.report()).unwrap();
        assert_eq!(json["completeness"], "incomplete");
        assert_eq!(json["ranges"][0]["quality"], "actual");
        assert_eq!(json["ranges"][1]["quality"], "missing");
        assert_eq!(json["overview"]["p1"].as_str().unwrap().len(), 48);
    }
}
