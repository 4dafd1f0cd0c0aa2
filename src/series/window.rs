//! Time-window filter
//!
//! Truncates a region's series to the interval ending at its sampling date:
//! either the trailing `span_hours` or explicit `dd.mm.yyyy HH:MM` bounds.
//! Both ends are inclusive.

use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

use super::{parse_datetime, EnvironmentalSeries, Region, RegionSeries};
use crate::error::{Result, SelectivityError};

/// Per-region sampling dates plus the window shape
#[derive(Debug, Clone)]
pub struct SamplingWindow {
    pub sampling: BTreeMap<Region, NaiveDateTime>,
    pub span_hours: i64,
    pub explicit_start: Option<String>,
    pub explicit_end: Option<String>,
}

impl SamplingWindow {
    /// Window every region present in `series` around its own sampling date
    pub fn apply(&self, series: &EnvironmentalSeries) -> Result<Vec<RegionSeries>> {
        series
            .regions()
            .into_iter()
            .map(|region| {
                let sampling = self.sampling.get(&region).copied().ok_or_else(|| {
                    SelectivityError::invalid_parameter(
                        &format!("sampling_dates.{region}"),
                        "<missing>",
                        "every region present in the series needs a sampling date",
                    )
                })?;
                let sub = series.region(region);
                window(
                    &sub,
                    sampling,
                    self.span_hours,
                    self.explicit_start.as_deref(),
                    self.explicit_end.as_deref(),
                )
            })
            .collect()
    }
}

/// Resolve the inclusive `[start, end]` interval for one sampling date
///
/// - no explicit end: end = sampling date
/// - explicit end: must parse and must not postdate the sampling date
/// - no explicit start: start = end - span
/// - explicit start: must parse and must not postdate end
pub fn resolve_bounds(
    sampling: NaiveDateTime,
    span_hours: i64,
    explicit_start: Option<&str>,
    explicit_end: Option<&str>,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let end = match explicit_end {
        None => sampling,
        Some(raw) => {
            let end = parse_datetime(raw).map_err(|_| SelectivityError::InvalidDateRange {
                parameter: "end".to_string(),
                reason: format!("'{raw}' is not dd.mm.yyyy HH:MM"),
            })?;
            if end > sampling {
                return Err(SelectivityError::InvalidDateRange {
                    parameter: "end".to_string(),
                    reason: format!("{end} is later than sampling date {sampling}"),
                });
            }
            end
        }
    };

    let start = match explicit_start {
        None => {
            if span_hours < 0 {
                return Err(SelectivityError::InvalidDateRange {
                    parameter: "span_hours".to_string(),
                    reason: format!("negative span {span_hours}"),
                });
            }
            end - Duration::hours(span_hours)
        }
        Some(raw) => parse_datetime(raw).map_err(|_| SelectivityError::InvalidDateRange {
            parameter: "start".to_string(),
            reason: format!("'{raw}' is not dd.mm.yyyy HH:MM"),
        })?,
    };

    if start > end {
        return Err(SelectivityError::InvalidDateRange {
            parameter: "start".to_string(),
            reason: format!("{start} is later than end {end}"),
        });
    }

    Ok((start, end))
}

/// Restrict `series` to `start <= t <= end`
pub fn window(
    series: &RegionSeries,
    sampling: NaiveDateTime,
    span_hours: i64,
    explicit_start: Option<&str>,
    explicit_end: Option<&str>,
) -> Result<RegionSeries> {
    let (start, end) = resolve_bounds(sampling, span_hours, explicit_start, explicit_end)?;

    tracing::info!(region = %series.region, %start, %end, "Resolved time window");

    let windowed = series.filter_rows(|ts| *ts >= start && *ts <= end);
    tracing::debug!(
        "Window kept {}/{} rows for region {}",
        windowed.len(),
        series.len(),
        series.region
    );
    Ok(windowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::hourly;
    use crate::series::{EnvVariable, PositionColumn};

    fn east_series(n: usize) -> RegionSeries {
        let values = (0..n).map(|i| Some(i as f64)).collect();
        let series = EnvironmentalSeries::new(
            EnvVariable::AirTemperature,
            hourly(n),
            vec![PositionColumn::tagged("E1", values).unwrap()],
        )
        .unwrap();
        series.region(Region::East)
    }

    #[test]
    fn test_trailing_span_is_inclusive() {
        let series = east_series(100);
        let sampling = series.timestamps[50];
        let windowed = window(&series, sampling, 10, None, None).unwrap();

        assert_eq!(windowed.len(), 11);
        assert_eq!(windowed.timestamps[0], series.timestamps[40]);
        assert_eq!(*windowed.timestamps.last().unwrap(), sampling);
    }

    #[test]
    fn test_window_is_idempotent() {
        let series = east_series(100);
        let sampling = series.timestamps[80];
        let once = window(&series, sampling, 24, None, None).unwrap();
        let twice = window(&once, sampling, 24, None, None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_explicit_bounds() {
        let series = east_series(48);
        let sampling = series.timestamps[47];
        let windowed = window(
            &series,
            sampling,
            0,
            Some("01.01.2020 05:00"),
            Some("01.01.2020 10:00"),
        )
        .unwrap();
        assert_eq!(windowed.len(), 6);
        assert_eq!(windowed.columns[0].values[0], Some(5.0));
    }

    #[test]
    fn test_explicit_end_after_sampling_fails() {
        let series = east_series(10);
        let sampling = series.timestamps[5];
        let err = window(&series, sampling, 2, None, Some("01.01.2020 09:00")).unwrap_err();
        assert!(matches!(err, SelectivityError::InvalidDateRange { ref parameter, .. } if parameter == "end"));
    }

    #[test]
    fn test_malformed_bounds_fail() {
        let series = east_series(10);
        let sampling = series.timestamps[9];
        assert!(matches!(
            window(&series, sampling, 2, Some("2020-01-01"), None),
            Err(SelectivityError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            window(&series, sampling, 2, None, Some("yesterday")),
            Err(SelectivityError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_sampling_window_requires_every_region() {
        let cols = vec![
            PositionColumn::tagged("E1", vec![Some(1.0); 5]).unwrap(),
            PositionColumn::tagged("W1", vec![Some(2.0); 5]).unwrap(),
        ];
        let series = EnvironmentalSeries::new(EnvVariable::SoilTemperature, hourly(5), cols).unwrap();
        let mut sampling = BTreeMap::new();
        sampling.insert(Region::East, series.timestamps[4]);

        let sampling_window = SamplingWindow {
            sampling,
            span_hours: 2,
            explicit_start: None,
            explicit_end: None,
        };
        assert!(matches!(sampling_window.apply(&series), Err(SelectivityError::InvalidParameter { .. })));
    }
}
