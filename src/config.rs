use crate::boundary::MINUTES_PER_DAY;
use crate::error::{AppError, Result};
use crate::models::PointDescriptor;
use crate::quality::QualityAlphabet;
use crate::scheduler::{PollSchedule, Scheduler};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::{fs, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DbConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub characterisation: CharacterisationConfig,
    #[serde(default)]
    pub quality_alphabet: QualityAlphabet,
    pub systems: Vec<SystemConfig>,
    #[serde(default)]
    pub pollers: Vec<PollerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// Fixed offset used for wall-clock alignment and local days.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Completed intervals to recompute once at startup.
    #[serde(default)]
    pub backfill_intervals: u32,
}

fn default_interval_minutes() -> u32 {
    5
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            utc_offset_minutes: 0,
            backfill_intervals: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterisationConfig {
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u32,
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_period_minutes() -> u32 {
    30
}

fn default_days() -> u32 {
    1
}

impl Default for CharacterisationConfig {
    fn default() -> Self {
        Self {
            period_minutes: default_period_minutes(),
            days: default_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub id: String,
    pub points: Vec<PointDescriptor>,
}

impl SystemConfig {
    pub fn point_ids(&self) -> Vec<String> {
        self.points.iter().map(|p| p.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub entity: String,
    pub interval_minutes: u32,
    #[serde(default)]
    pub tolerance_seconds: u32,
    /// Falls back to `rollup.utc_offset_minutes`.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    /// Afterwards, if DATABASE_URL env is set, override `database.url`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut cfg = Self::from_yaml(&raw)?;
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let expanded = expand_env_placeholders(raw)?;
        let cfg: Self = serde_yaml::from_str(&expanded)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.systems.is_empty() {
            return Err(AppError::Config(
                "config must include at least one system".into(),
            ));
        }
        if !(1..=MINUTES_PER_DAY).contains(&self.rollup.interval_minutes) {
            return Err(AppError::Config(format!(
                "rollup.interval_minutes must be between 1 and {}, got {}",
                MINUTES_PER_DAY, self.rollup.interval_minutes
            )));
        }
        let period = self.characterisation.period_minutes;
        if period == 0 || MINUTES_PER_DAY % period != 0 {
            return Err(AppError::Config(format!(
                "characterisation.period_minutes must divide a day, got {}",
                period
            )));
        }
        if self.characterisation.days == 0 {
            return Err(AppError::Config(
                "characterisation.days must be at least 1".into(),
            ));
        }

        let mut system_ids = HashSet::new();
        for system in &self.systems {
            if !system_ids.insert(system.id.as_str()) {
                return Err(AppError::Config(format!("duplicate system '{}'", system.id)));
            }
            let mut point_ids = HashSet::new();
            for point in &system.points {
                if point.id.trim().is_empty() {
                    return Err(AppError::Config(format!(
                        "system '{}' has a point with an empty id",
                        system.id
                    )));
                }
                if !point_ids.insert(point.id.as_str()) {
                    return Err(AppError::Config(format!(
                        "system '{}' declares point '{}' twice",
                        system.id, point.id
                    )));
                }
            }
        }

        for poller in &self.pollers {
            if poller.interval_minutes == 0 {
                return Err(AppError::Config(format!(
                    "poller '{}' interval_minutes must be positive",
                    poller.entity
                )));
            }
        }

        self.quality_alphabet.validate()
    }

    /// Scheduler over the configured pollers.
    pub fn scheduler(&self) -> Scheduler {
        let schedules: HashMap<String, PollSchedule> = self
            .pollers
            .iter()
            .map(|p| {
                (
                    p.entity.clone(),
                    PollSchedule::new(
                        p.interval_minutes,
                        p.tolerance_seconds,
                        p.utc_offset_minutes
                            .unwrap_or(self.rollup.utc_offset_minutes),
                    ),
                )
            })
            .collect();
        Scheduler::new(schedules)
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
/// "$$" becomes a literal "$"; any other '$' is kept as-is.
fn expand_env_placeholders(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let close = match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };
        it.next();
        let var = read_until(&mut it, close).ok_or_else(|| {
            AppError::Config(format!("unterminated env placeholder: missing '{}'", close))
        })?;
        let val = std::env::var(&var)
            .map_err(|_| AppError::Config(format!("missing environment variable: {}", var)))?;
        out.push_str(&val);
    }

    Ok(out)
}

/// Read characters until we hit `end`, consuming the closing delimiter.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
