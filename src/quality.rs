use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Provenance tag carried by every raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Actual,
    Forecast,
    Billable,
    Estimated,
    Error,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Actual,
        Quality::Forecast,
        Quality::Billable,
        Quality::Estimated,
        Quality::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Actual => "actual",
            Quality::Forecast => "forecast",
            Quality::Billable => "billable",
            Quality::Estimated => "estimated",
            Quality::Error => "error",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Quality::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Config(format!("unknown quality: {}", s)))
    }
}

/// Rendered for a quality missing from [`QualityAlphabet::codes`].
pub const UNMAPPED_CODE: char = '?';

/// Single-character codes used to render a per-period quality timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAlphabet {
    #[serde(default = "default_codes")]
    pub codes: BTreeMap<Quality, char>,
    /// Symbol for a period with no data.
    #[serde(default = "default_absent")]
    pub absent: char,
    /// Symbol for a period where present points disagree on quality.
    #[serde(default = "default_mixed")]
    pub mixed: char,
}

fn default_codes() -> BTreeMap<Quality, char> {
    BTreeMap::from([
        (Quality::Actual, 'a'),
        (Quality::Forecast, 'f'),
        (Quality::Billable, 'b'),
        (Quality::Estimated, 'e'),
        (Quality::Error, 'x'),
    ])
}

fn default_absent() -> char {
    '.'
}

fn default_mixed() -> char {
    '*'
}

impl Default for QualityAlphabet {
    fn default() -> Self {
        Self {
            codes: default_codes(),
            absent: default_absent(),
            mixed: default_mixed(),
        }
    }
}

impl QualityAlphabet {
    /// Code for a quality; qualities left out of the configured map fall back to [`UNMAPPED_CODE`].
    pub fn code(&self, quality: Quality) -> char {
        self.codes.get(&quality).copied().unwrap_or(UNMAPPED_CODE)
    }

    /// Every code, including the absent, mixed and unmapped symbols, must be distinct.
    pub fn validate(&self) -> Result<()> {
        if self.absent == self.mixed {
            return Err(AppError::Config(
                "quality alphabet: absent and mixed symbols must differ".into(),
            ));
        }
        if self.absent == UNMAPPED_CODE || self.mixed == UNMAPPED_CODE {
            return Err(AppError::Config(format!(
                "quality alphabet: '{}' is reserved for unmapped qualities",
                UNMAPPED_CODE
            )));
        }
        let mut seen: Vec<char> = vec![self.absent, self.mixed, UNMAPPED_CODE];
        for (quality, code) in &self.codes {
            if seen.contains(code) {
                return Err(AppError::Config(format!(
                    "quality alphabet: code '{}' for {} is already in use",
                    code, quality
                )));
            }
            seen.push(*code);
        }
        Ok(())
    }
}
