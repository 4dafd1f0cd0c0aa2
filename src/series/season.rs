//! Meteorological season filter
//!
//! Applied after windowing: it narrows an already-windowed interval, never
//! widens it.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::RegionSeries;

/// Calendar season, or no restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
    #[default]
    All,
}

impl Season {
    /// Season a calendar month (1-12) belongs to
    pub fn of_month(month: u32) -> Season {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::All => "all",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `timestamp` falls in `season`
pub fn in_season(timestamp: &NaiveDateTime, season: Season) -> bool {
    season == Season::All || Season::of_month(timestamp.month()) == season
}

/// Keep only the rows inside `season`
pub fn filter_season(series: &RegionSeries, season: Season) -> RegionSeries {
    if season == Season::All {
        return series.clone();
    }
    let filtered = series.filter_rows(|ts| in_season(ts, season));
    tracing::debug!(
        "Season {} kept {}/{} rows for region {}",
        season,
        filtered.len(),
        series.len(),
        series.region
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn first_of(month: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, month, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_seasons_partition_the_year() {
        let seasons = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];
        for month in 1..=12 {
            let ts = first_of(month);
            let hits = seasons.iter().filter(|s| in_season(&ts, **s)).count();
            assert_eq!(hits, 1, "month {month} must belong to exactly one season");
            assert!(in_season(&ts, Season::All));
        }
    }

    #[test]
    fn test_month_mapping() {
        assert_eq!(Season::of_month(12), Season::Winter);
        assert_eq!(Season::of_month(2), Season::Winter);
        assert_eq!(Season::of_month(3), Season::Spring);
        assert_eq!(Season::of_month(8), Season::Summer);
        assert_eq!(Season::of_month(11), Season::Autumn);
    }

    #[test]
    fn test_season_deserializes_lowercase() {
        let s: Season = serde_json::from_str("\"autumn\"").unwrap();
        assert_eq!(s, Season::Autumn);
    }
}
