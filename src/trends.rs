use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

pub const DEFAULT_STABLE_THRESHOLD: f64 = 0.01;

/// One stored numeric measurement of a site parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub recorded_on: NaiveDate,
    pub parameter: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendDirection {
    #[serde(rename = "stable")]
    Stable,
    #[serde(rename = "croissante")]
    Rising,
    #[serde(rename = "décroissante")]
    Falling,
}

impl TrendDirection {
    pub fn label(self) -> &'static str {
        match self {
            TrendDirection::Stable => "stable",
            TrendDirection::Rising => "croissante",
            TrendDirection::Falling => "décroissante",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterTrend {
    pub parameter: String,
    pub first_value: f64,
    pub current_value: f64,
    pub change: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub measurements: usize,
    /// Least-squares slope, in units per day.
    pub slope: f64,
    pub direction: TrendDirection,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

pub fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

/// One trend per parameter with at least two measurements, sorted by name.
pub fn compute_trends(observations: &[Observation], stable_threshold: f64) -> Vec<ParameterTrend> {
    let mut by_parameter: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for observation in observations.iter().filter(|o| o.value.is_finite()) {
        by_parameter
            .entry(observation.parameter.as_str())
            .or_default()
            .push(observation);
    }

    by_parameter
        .into_iter()
        .filter_map(|(parameter, mut series)| {
            if series.len() < 2 {
                return None;
            }
            series.sort_by_key(|o| o.recorded_on);
            Some(trend_for(parameter, &series, stable_threshold))
        })
        .collect()
}

fn trend_for(parameter: &str, series: &[&Observation], stable_threshold: f64) -> ParameterTrend {
    let first = series[0];
    let last = series[series.len() - 1];
    let values: Vec<f64> = series.iter().map(|o| o.value).collect();
    let days: Vec<f64> = series
        .iter()
        .map(|o| (o.recorded_on - first.recorded_on).num_days() as f64)
        .collect();

    let slope = slope(&days, &values);
    let direction = if slope.abs() < stable_threshold {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Rising
    } else {
        TrendDirection::Falling
    };

    ParameterTrend {
        parameter: parameter.to_string(),
        first_value: first.value,
        current_value: last.value,
        change: last.value - first.value,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: values.iter().sum::<f64>() / values.len() as f64,
        measurements: values.len(),
        slope,
        direction,
        first_date: first.recorded_on,
        last_date: last.recorded_on,
    }
}

/// Ordinary least squares; 0 when every x is the same.
pub fn slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }

    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let (covariance, variance) = xs[..n]
        .iter()
        .zip(&ys[..n])
        .fold((0.0, 0.0), |(cov, var), (x, y)| {
            (cov + (x - mean_x) * (y - mean_y), var + (x - mean_x).powi(2))
        });

    if variance == 0.0 {
        0.0
    } else {
        covariance / variance
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn obs(day: u32, parameter: &str, value: f64) -> Observation {
        Observation {
            recorded_on: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            parameter: parameter.to_string(),
            value,
        }
    }

    #[test]
    fn cutoff_is_at_least_one_day_back() {
        let today = Utc::now().date_naive();
        assert_eq!(cutoff_date(0), today - Duration::days(1));
        assert_eq!(cutoff_date(90), today - Duration::days(90));
    }

    #[test]
    fn slope_of_a_line() {
        assert_relative_eq!(slope(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0]), 2.0);
        assert_eq!(slope(&[3.0, 3.0], &[1.0, 9.0]), 0.0);
        assert_eq!(slope(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn rising_series_reports_change_and_stats() {
        let trends = compute_trends(
            &[obs(10, "Nitrates", 30.0), obs(1, "Nitrates", 20.0), obs(20, "Nitrates", 40.0)],
            DEFAULT_STABLE_THRESHOLD,
        );
        assert_eq!(trends.len(), 1);
        let trend = &trends[0];
        assert_eq!(trend.first_value, 20.0);
        assert_eq!(trend.current_value, 40.0);
        assert_eq!(trend.change, 20.0);
        assert_eq!(trend.min, 20.0);
        assert_eq!(trend.max, 40.0);
        assert_relative_eq!(trend.mean, 30.0);
        assert_eq!(trend.measurements, 3);
        assert_eq!(trend.direction, TrendDirection::Rising);
        assert!(trend.slope > 1.0);
    }

    #[test]
    fn flat_and_falling_series() {
        let trends = compute_trends(
            &[
                obs(1, "pH", 7.2),
                obs(15, "pH", 7.2),
                obs(1, "Turbidité", 4.0),
                obs(11, "Turbidité", 2.0),
            ],
            DEFAULT_STABLE_THRESHOLD,
        );
        let names: Vec<&str> = trends.iter().map(|t| t.parameter.as_str()).collect();
        assert_eq!(names, vec!["Turbidité", "pH"]);
        assert_eq!(trends[0].direction, TrendDirection::Falling);
        assert_eq!(trends[1].direction, TrendDirection::Stable);
    }

    #[test]
    fn single_measurements_and_same_day_series() {
        let trends = compute_trends(
            &[obs(1, "CO2", 400.0), obs(5, "SO2", 10.0), obs(5, "SO2", 90.0)],
            DEFAULT_STABLE_THRESHOLD,
        );
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].parameter, "SO2");
        assert_eq!(trends[0].slope, 0.0);
        assert_eq!(trends[0].direction, TrendDirection::Stable);
    }
}
