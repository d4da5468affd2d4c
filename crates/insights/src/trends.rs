//! Trend direction, revenue forecasting, seasonality and anomaly
//! detection over ordered daily snapshots.

use anyhow::{bail, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// One day of aggregate activity, the analyzer's input unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub revenue: f64,
    pub orders: u64,
    pub visitors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    Orders,
    Visitors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// One projected day in the revenue forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub projected_revenue: f64,
    /// Percentage confidence, decaying with horizon, floored at 50.
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seasonality {
    /// Hours (0-23) whose traffic exceeds 1.5x the 24-hour average, top 3.
    pub peak_hours: Vec<u32>,
    /// Top 3 weekdays by average traffic.
    pub peak_days: Vec<Weekday>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: AnomalySeverity,
    pub observed: f64,
    pub expected: f64,
}

fn metric_value(snapshot: &DailySnapshot, metric: Metric) -> f64 {
    match metric {
        Metric::Revenue => snapshot.revenue,
        Metric::Orders => snapshot.orders as f64,
        Metric::Visitors => snapshot.visitors as f64,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentage change of the last-7-day mean against the prior window.
/// Requires at least 7 snapshots.
fn growth_pct(snapshots: &[DailySnapshot], metric: Metric) -> Result<f64> {
    if snapshots.len() < 7 {
        bail!(
            "trend analysis requires at least 7 daily snapshots, got {}",
            snapshots.len()
        );
    }
    let values: Vec<f64> = snapshots.iter().map(|s| metric_value(s, metric)).collect();
    let split = values.len() - 7;
    let recent = mean(&values[split..]);
    let prior_start = split.saturating_sub(7);
    let prior = mean(&values[prior_start..split]);

    if prior == 0.0 {
        // No baseline: flat if nothing happened, fully "up" otherwise.
        return Ok(if recent == 0.0 { 0.0 } else { 100.0 });
    }
    Ok((recent - prior) / prior * 100.0)
}

/// Classifies the metric's direction: mean of the last 7 days against the
/// prior 7, up above +5%, down below -5%, stable between.
pub fn direction(snapshots: &[DailySnapshot], metric: Metric) -> Result<TrendDirection> {
    let change = growth_pct(snapshots, metric)?;
    Ok(if change > 5.0 {
        TrendDirection::Up
    } else if change < -5.0 {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    })
}

/// Projects the 7-day revenue average forward seven days, scaling by the
/// observed growth rate. Confidence starts at 90% and sheds 5 points per
/// day of horizon, floored at 50%.
pub fn forecast_revenue(snapshots: &[DailySnapshot]) -> Result<Vec<ForecastPoint>> {
    let growth_rate = growth_pct(snapshots, Metric::Revenue)? / 100.0;
    let split = snapshots.len() - 7;
    let avg: f64 = mean(
        &snapshots[split..]
            .iter()
            .map(|s| s.revenue)
            .collect::<Vec<_>>(),
    );
    let last_date = snapshots
        .last()
        .map(|s| s.date)
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    Ok((1..=7)
        .map(|i| ForecastPoint {
            date: last_date + Duration::days(i),
            projected_revenue: avg * (1.0 + growth_rate / 7.0 * i as f64),
            confidence: (90.0 - 5.0 * (i - 1) as f64).max(50.0),
        })
        .collect())
}

/// Derives peak hours from a 24-slot hourly traffic histogram and peak
/// weekdays from the daily snapshots.
pub fn seasonality(hourly_traffic: &[u64; 24], snapshots: &[DailySnapshot]) -> Seasonality {
    let hourly_avg = hourly_traffic.iter().sum::<u64>() as f64 / 24.0;
    let mut hot_hours: Vec<(u32, u64)> = hourly_traffic
        .iter()
        .enumerate()
        .filter(|(_, &count)| count as f64 > hourly_avg * 1.5)
        .map(|(hour, &count)| (hour as u32, count))
        .collect();
    hot_hours.sort_by(|a, b| b.1.cmp(&a.1));
    let peak_hours = hot_hours.into_iter().take(3).map(|(h, _)| h).collect();

    // Average traffic per weekday across all recorded days.
    let mut by_weekday: [(f64, u32); 7] = [(0.0, 0); 7];
    for snapshot in snapshots {
        let idx = snapshot.date.weekday().num_days_from_monday() as usize;
        by_weekday[idx].0 += snapshot.visitors as f64;
        by_weekday[idx].1 += 1;
    }
    let mut day_averages: Vec<(Weekday, f64)> = by_weekday
        .iter()
        .enumerate()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(idx, (total, count))| {
            let weekday = match idx {
                0 => Weekday::Mon,
                1 => Weekday::Tue,
                2 => Weekday::Wed,
                3 => Weekday::Thu,
                4 => Weekday::Fri,
                5 => Weekday::Sat,
                _ => Weekday::Sun,
            };
            (weekday, total / *count as f64)
        })
        .collect();
    day_averages.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let peak_days = day_averages.into_iter().take(3).map(|(d, _)| d).collect();

    Seasonality {
        peak_hours,
        peak_days,
    }
}

/// Compares today's page-view count against the historical average
/// (excluding today): above 2x is a spike, below 0.5x a drop.
pub fn detect_anomaly(today_page_views: u64, historical: &[u64]) -> Option<Anomaly> {
    if historical.is_empty() {
        return None;
    }
    let expected = historical.iter().sum::<u64>() as f64 / historical.len() as f64;
    if expected == 0.0 {
        return None;
    }
    let observed = today_page_views as f64;

    if observed > expected * 2.0 {
        Some(Anomaly {
            kind: AnomalyKind::Spike,
            severity: AnomalySeverity::Medium,
            observed,
            expected,
        })
    } else if observed < expected * 0.5 {
        Some(Anomaly {
            kind: AnomalyKind::Drop,
            severity: AnomalySeverity::High,
            observed,
            expected,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(revenues: &[f64]) -> Vec<DailySnapshot> {
        let start = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        revenues
            .iter()
            .enumerate()
            .map(|(i, &revenue)| DailySnapshot {
                date: start + Duration::days(i as i64),
                revenue,
                orders: (revenue / 50.0) as u64,
                visitors: (revenue * 2.0) as u64,
            })
            .collect()
    }

    #[test]
    fn test_direction_requires_seven_days() {
        let snapshots = series(&[100.0; 6]);
        assert!(direction(&snapshots, Metric::Revenue).is_err());
    }

    #[test]
    fn test_growing_series_is_up() {
        // 10% daily growth for 14 days.
        let revenues: Vec<f64> = (0..14).map(|i| 100.0 * 1.1f64.powi(i)).collect();
        let snapshots = series(&revenues);
        assert_eq!(
            direction(&snapshots, Metric::Revenue).unwrap(),
            TrendDirection::Up
        );
    }

    #[test]
    fn test_flat_series_is_stable() {
        let snapshots = series(&[250.0; 14]);
        assert_eq!(
            direction(&snapshots, Metric::Revenue).unwrap(),
            TrendDirection::Stable
        );
    }

    #[test]
    fn test_declining_series_is_down() {
        let revenues: Vec<f64> = (0..14).map(|i| 1000.0 - 60.0 * i as f64).collect();
        let snapshots = series(&revenues);
        assert_eq!(
            direction(&snapshots, Metric::Revenue).unwrap(),
            TrendDirection::Down
        );
    }

    #[test]
    fn test_forecast_monotonic_with_decaying_confidence() {
        let revenues: Vec<f64> = (0..14).map(|i| 100.0 * 1.1f64.powi(i)).collect();
        let snapshots = series(&revenues);
        let forecast = forecast_revenue(&snapshots).unwrap();

        assert_eq!(forecast.len(), 7);
        for window in forecast.windows(2) {
            assert!(window[1].projected_revenue > window[0].projected_revenue);
            assert!(window[1].confidence <= window[0].confidence);
        }
        assert_eq!(forecast[0].confidence, 90.0);
        assert_eq!(forecast[6].confidence, 60.0);
        assert!(forecast.iter().all(|p| p.confidence >= 50.0));
    }

    #[test]
    fn test_seasonality_peaks() {
        let mut hourly = [10u64; 24];
        hourly[12] = 40;
        hourly[18] = 60;
        hourly[20] = 30;
        // 14 days starting on a Saturday; weekend visitors doubled.
        let start = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let snapshots: Vec<DailySnapshot> = (0..14)
            .map(|i| {
                let date = start + Duration::days(i);
                let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
                DailySnapshot {
                    date,
                    revenue: 100.0,
                    orders: 2,
                    visitors: if weekend { 400 } else { 200 },
                }
            })
            .collect();

        let result = seasonality(&hourly, &snapshots);
        assert_eq!(result.peak_hours, vec![18, 12, 20]);
        assert!(result.peak_days.contains(&Weekday::Sat));
        assert!(result.peak_days.contains(&Weekday::Sun));
    }

    #[test]
    fn test_anomaly_spike_and_drop() {
        let history = [100u64, 110, 90, 105];
        let spike = detect_anomaly(250, &history).unwrap();
        assert_eq!(spike.kind, AnomalyKind::Spike);
        assert_eq!(spike.severity, AnomalySeverity::Medium);

        let drop = detect_anomaly(40, &history).unwrap();
        assert_eq!(drop.kind, AnomalyKind::Drop);
        assert_eq!(drop.severity, AnomalySeverity::High);

        assert!(detect_anomaly(120, &history).is_none());
    }
}
