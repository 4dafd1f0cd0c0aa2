//! Environmental time series
//!
//! Long per-position series of one environmental variable, tagged once with
//! their region at construction. Downstream steps never look at column names
//! again to decide east/west.
//!
//! - `window`: trailing-span / explicit-bound truncation around a sampling date
//! - `season`: meteorological season predicate

pub mod season;
pub mod window;

pub use season::{filter_season, in_season, Season};
pub use window::{resolve_bounds, window, SamplingWindow};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SelectivityError};

/// Fixed date-time layout of every input table and config bound
pub const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Parse a `dd.mm.yyyy HH:MM` string
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| SelectivityError::DateFormat {
        value: value.to_string(),
    })
}

/// Environmental variable under analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvVariable {
    #[serde(rename = "AT")]
    AirTemperature,
    #[serde(rename = "ST")]
    SoilTemperature,
    #[serde(rename = "SM")]
    SoilMoisture,
}

impl EnvVariable {
    /// Short code used in file names
    pub fn code(&self) -> &'static str {
        match self {
            EnvVariable::AirTemperature => "AT",
            EnvVariable::SoilTemperature => "ST",
            EnvVariable::SoilMoisture => "SM",
        }
    }
}

impl fmt::Display for EnvVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Sampling region of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    East,
    West,
}

impl Region {
    /// Derive the region tag from a position column name.
    ///
    /// A leading `E`/`W` wins; otherwise exactly one of the two letters must
    /// appear somewhere in the name.
    pub fn from_column_name(name: &str) -> Result<Self> {
        match name.chars().next() {
            Some('E') => return Ok(Region::East),
            Some('W') => return Ok(Region::West),
            _ => {}
        }
        match (name.contains('E'), name.contains('W')) {
            (true, false) => Ok(Region::East),
            (false, true) => Ok(Region::West),
            _ => Err(SelectivityError::UntaggedColumn { column: name.to_string() }),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::East => f.write_str("east"),
            Region::West => f.write_str("west"),
        }
    }
}

/// One position's values, aligned with the owning series' timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct PositionColumn {
    pub name: String,
    pub region: Region,
    /// `None` marks a missing reading
    pub values: Vec<Option<f64>>,
}

impl PositionColumn {
    /// Tag a column by its name
    pub fn tagged(name: &str, values: Vec<Option<f64>>) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            region: Region::from_column_name(name)?,
            values,
        })
    }

    /// Non-missing readings
    pub fn observed(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(|v| *v).filter(|v| v.is_finite())
    }
}

/// Full multi-region series for one variable
#[derive(Debug, Clone)]
pub struct EnvironmentalSeries {
    pub variable: EnvVariable,
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<PositionColumn>,
}

impl EnvironmentalSeries {
    /// Build a series, checking timestamp order and column lengths
    pub fn new(
        variable: EnvVariable,
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<PositionColumn>,
    ) -> Result<Self> {
        if let Some(row) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return Err(SelectivityError::NonMonotonicTimestamps { row: row + 1 });
        }
        for column in &columns {
            if column.values.len() != timestamps.len() {
                return Err(SelectivityError::ShapeMismatch {
                    context: format!("values of position '{}'", column.name),
                    expected: timestamps.len(),
                    found: column.values.len(),
                });
            }
        }
        Ok(Self { variable, timestamps, columns })
    }

    /// Regions present, in order
    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.columns.iter().map(|c| c.region).collect();
        regions.sort();
        regions.dedup();
        regions
    }

    /// Sub-table holding only one region's positions
    pub fn region(&self, region: Region) -> RegionSeries {
        RegionSeries {
            region,
            timestamps: self.timestamps.clone(),
            columns: self
                .columns
                .iter()
                .filter(|c| c.region == region)
                .cloned()
                .collect(),
        }
    }
}

/// Positions of a single region sharing one time axis
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSeries {
    pub region: Region,
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<PositionColumn>,
}

impl RegionSeries {
    /// Number of time steps
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Position names in column order
    pub fn positions(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Keep the rows whose timestamp satisfies `keep`
    pub fn filter_rows<F>(&self, keep: F) -> RegionSeries
    where
        F: Fn(&NaiveDateTime) -> bool,
    {
        let rows: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(_, ts)| keep(ts))
            .map(|(i, _)| i)
            .collect();

        RegionSeries {
            region: self.region,
            timestamps: rows.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| PositionColumn {
                    name: c.name.clone(),
                    region: c.region,
                    values: rows.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{Duration, NaiveDate};

    /// Hourly timestamps starting at 01.01.2020 00:00
    pub fn hourly(n: usize) -> Vec<NaiveDateTime> {
        let origin = NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        (0..n).map(|h| origin + Duration::hours(h as i64)).collect()
    }
}
