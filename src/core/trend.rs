use chrono::{Days, NaiveDate};
use std::collections::HashMap;

use crate::core::store::DailyCount;

/// Days of history averaged into the spike baseline.
pub const BASELINE_DAYS: usize = 7;
/// Minimum baseline before a spike can be called at all.
pub const BASELINE_FLOOR: f64 = 3.0;
pub const SPIKE_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TrendPoint {
    pub day: NaiveDate,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Spike {
    pub detected: bool,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub yesterday: i64,
    /// Rounded to two decimals; detection uses the exact mean.
    pub baseline: f64,
}

/// First day of a `days`-long window ending on `today`.
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN)
}

/// Exactly `days` points from `window_start`, zero where no row exists.
pub fn build_trend(window_start: NaiveDate, days: u32, rows: &[DailyCount]) -> Vec<TrendPoint> {
    let by_day: HashMap<NaiveDate, i64> = rows.iter().map(|r| (r.day, r.count)).collect();
    window_start
        .iter_days()
        .take(days as usize)
        .map(|day| TrendPoint {
            day,
            count: by_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

/// Compares the second-to-last point ("yesterday", the last complete day)
/// with the mean of up to [`BASELINE_DAYS`] points before it.
pub fn compute_spike(trend: &[TrendPoint]) -> Spike {
    let values: Vec<i64> = trend.iter().map(|p| p.count).collect();
    compute_spike_values(&values)
}

pub fn compute_spike_values(values: &[i64]) -> Spike {
    if values.len() < 2 {
        return Spike {
            detected: false,
            yesterday: 0,
            baseline: 0.0,
        };
    }
    let y_idx = values.len() - 2;
    let yesterday = values[y_idx];
    let window = &values[y_idx.saturating_sub(BASELINE_DAYS)..y_idx];
    let baseline = if window.is_empty() {
        0.0
    } else {
        window.iter().map(|v| *v as f64).sum::<f64>() / window.len() as f64
    };
    let detected = baseline >= BASELINE_FLOOR && yesterday as f64 >= SPIKE_FACTOR * baseline;
    Spike {
        detected,
        yesterday,
        baseline: (baseline * 100.0).round() / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    /// Seven baseline days of `baseline`, then yesterday, then today.
    fn series(baseline: i64, yesterday: i64) -> Vec<i64> {
        let mut v = vec![baseline; 7];
        v.push(yesterday);
        v.push(0);
        v
    }

    #[test]
    fn trend_is_zero_filled_to_exact_length() {
        let rows = vec![
            DailyCount { day: d(3, 2), count: 4 },
            DailyCount { day: d(3, 5), count: 1 },
            // Outside the window; ignored.
            DailyCount { day: d(4, 30), count: 99 },
        ];
        let trend = build_trend(d(3, 1), 7, &rows);
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[0], TrendPoint { day: d(3, 1), count: 0 });
        assert_eq!(trend[1].count, 4);
        assert_eq!(trend[4].count, 1);
        assert_eq!(trend[6].day, d(3, 7));
        assert_eq!(trend.iter().map(|p| p.count).sum::<i64>(), 5);
    }

    #[test]
    fn trend_crosses_month_boundary() {
        let trend = build_trend(d(2, 27), 4, &[]);
        let days: Vec<_> = trend.iter().map(|p| p.day).collect();
        assert_eq!(days, vec![d(2, 27), d(2, 28), d(3, 1), d(3, 2)]);
        assert!(trend.iter().all(|p| p.count == 0));
    }

    #[test]
    fn zero_filled_days_serialize_as_string_zero() {
        let trend = build_trend(d(3, 1), 2, &[]);
        let json = serde_json::to_value(&trend).unwrap();
        assert_eq!(json[0]["count"], "0");
        assert_eq!(json[1]["day"], "2026-03-02");
    }

    #[test]
    fn window_start_covers_days_inclusive() {
        assert_eq!(window_start(d(3, 14), 14), d(3, 1));
        assert_eq!(window_start(d(3, 14), 1), d(3, 14));
    }

    #[test]
    fn spike_boundaries() {
        assert!(compute_spike_values(&series(3, 6)).detected);
        assert!(!compute_spike_values(&series(3, 5)).detected);
        assert!(!compute_spike_values(&series(2, 100)).detected);
    }

    #[test]
    fn fewer_than_two_points_never_spike() {
        assert!(!compute_spike_values(&[]).detected);
        assert!(!compute_spike_values(&[100]).detected);
    }

    #[test]
    fn baseline_uses_only_days_before_yesterday() {
        // Baseline window is [4, 4] (two days), yesterday = 8.
        let spike = compute_spike_values(&[4, 4, 8, 1]);
        assert_eq!(spike.yesterday, 8);
        assert_eq!(spike.baseline, 4.0);
        assert!(spike.detected);

        // Older days beyond the seven-day baseline are ignored.
        let mut values = vec![1000];
        values.extend(series(3, 6));
        assert!(compute_spike_values(&values).detected);
    }

    #[test]
    fn baseline_is_rounded_for_display_only() {
        // Mean of [3, 3, 4] is 3.333..; the exact threshold is 6.67.
        let spike = compute_spike_values(&[3, 3, 4, 7, 0]);
        assert_eq!(spike.baseline, 3.33);
        assert!(spike.detected);
        assert!(!compute_spike_values(&[3, 3, 4, 6, 0]).detected);
    }
}
