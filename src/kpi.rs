//! Month-over-month performance cards and cost variability.
//!
//! Everything here is a pure function of the history slice and the selected
//! period; callers pass the full table so trailing windows see months outside
//! the current filter.
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::filters::Selection;
use crate::types::{FleetRecord, WindowRow};
use crate::util::{
    average, linear_trend, month_key, months_before, moving_average,
    parse_month_key, safe_div, sample_std_dev,
};

/// Assumed working days for a month with no reading.
pub const DEFAULT_WORKING_DAYS: f64 = 22.0;

/// Which cost column the performance cards are computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CostMetric {
    #[default]
    FleetTotal,
    Maintenance,
    Fuel,
}

impl CostMetric {
    pub fn value(&self, r: &FleetRecord) -> f64 {
        match self {
            CostMetric::FleetTotal => r.fleet_total,
            CostMetric::Maintenance => r.maintenance_total,
            CostMetric::Fuel => r.fuel_total,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CostMetric::FleetTotal => "Fleet total",
            CostMetric::Maintenance => "Maintenance",
            CostMetric::Fuel => "Fuel and urea",
        }
    }
}

impl fmt::Display for CostMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CostMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total" | "fleet" | "fleet-total" => Ok(CostMetric::FleetTotal),
            "maintenance" => Ok(CostMetric::Maintenance),
            "fuel" => Ok(CostMetric::Fuel),
            other => Err(Error::Config(format!("unknown cost metric: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Increasing,
    Decreasing,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => f.write_str("Increasing"),
            Trend::Decreasing => f.write_str("Decreasing"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceKpis {
    pub metric: CostMetric,
    pub month: String,
    pub current: f64,
    pub previous: f64,
    pub diff_previous: f64,
    pub pct_vs_previous: f64,
    pub total_3m: f64,
    pub total_6m: f64,
    pub total_12m: f64,
    pub avg_3m: f64,
    pub avg_6m: f64,
    pub avg_12m: f64,
    pub diff_avg_3m: f64,
    pub diff_avg_6m: f64,
    pub diff_avg_12m: f64,
    pub pct_vs_avg_3m: f64,
    pub working_days_current: f64,
    pub working_days_previous: f64,
    pub cost_per_working_day: f64,
    pub cost_per_working_day_previous: f64,
    pub diff_cost_per_working_day: f64,
    pub working_days_3m: f64,
    pub cost_per_working_day_3m: f64,
    pub diff_cost_per_working_day_3m: f64,
    pub trend: Trend,
    pub vehicles: usize,
    pub cost_per_vehicle: f64,
}

impl PerformanceKpis {
    /// Current month against each trailing window, for tabular export.
    pub fn windows(&self) -> Vec<WindowRow> {
        vec![
            WindowRow {
                window: "Previous month".to_string(),
                total: self.previous,
                monthly_average: self.previous,
                diff_vs_current: self.diff_previous,
                months_with_data: None,
            },
            WindowRow {
                window: "Last 3 months".to_string(),
                total: self.total_3m,
                monthly_average: self.avg_3m,
                diff_vs_current: self.diff_avg_3m,
                months_with_data: Some(3),
            },
            WindowRow {
                window: "Last 6 months".to_string(),
                total: self.total_6m,
                monthly_average: self.avg_6m,
                diff_vs_current: self.diff_avg_6m,
                months_with_data: Some(6),
            },
            WindowRow {
                window: "Last 12 months".to_string(),
                total: self.total_12m,
                monthly_average: self.avg_12m,
                diff_vs_current: self.diff_avg_12m,
                months_with_data: Some(12),
            },
        ]
    }
}

/// Relative change in percent. A positive value against a non-positive base
/// is reported as a flat 100.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

fn pct_or_zero(current: f64, base: f64) -> f64 {
    if base > 0.0 {
        (current - base) / base * 100.0
    } else {
        0.0
    }
}

fn window_average(total: f64, months: f64) -> f64 {
    if total > 0.0 {
        total / months
    } else {
        0.0
    }
}

fn total<'a, I>(records: I, metric: CostMetric) -> f64
where
    I: Iterator<Item = &'a FleetRecord>,
{
    records.map(|r| metric.value(r)).sum()
}

/// Working days of the first record, or the default when it has none.
fn first_working_days<'a, I>(mut records: I) -> f64
where
    I: Iterator<Item = &'a FleetRecord>,
{
    records
        .next()
        .and_then(|r| r.working_days)
        .unwrap_or(DEFAULT_WORKING_DAYS)
}

pub fn performance_kpis(
    history: &[FleetRecord],
    year: &Selection<i32>,
    month: &Selection<String>,
    metric: CostMetric,
) -> Option<PerformanceKpis> {
    if year.is_all() {
        return None;
    }
    let base = parse_month_key(month.value()?)?;
    let current_key = month_key(base);
    let previous_key = month_key(months_before(base, 1));

    let in_window = |r: &&FleetRecord, months: u32| -> bool {
        r.date >= months_before(base, months) && r.date < base
    };

    let current_rows: Vec<&FleetRecord> =
        history.iter().filter(|r| r.month_key == current_key).collect();
    let previous_rows: Vec<&FleetRecord> =
        history.iter().filter(|r| r.month_key == previous_key).collect();
    let rows_3m: Vec<&FleetRecord> = history.iter().filter(|r| in_window(r, 3)).collect();

    let current = total(current_rows.iter().copied(), metric);
    let previous = total(previous_rows.iter().copied(), metric);
    let total_3m = total(rows_3m.iter().copied(), metric);
    let total_6m = total(history.iter().filter(|r| in_window(r, 6)), metric);
    let total_12m = total(history.iter().filter(|r| in_window(r, 12)), metric);

    let avg_3m = window_average(total_3m, 3.0);
    let avg_6m = window_average(total_6m, 6.0);
    let avg_12m = window_average(total_12m, 12.0);

    let working_days_current = first_working_days(current_rows.iter().copied());
    let working_days_previous = first_working_days(previous_rows.iter().copied());
    let cost_per_working_day = safe_div(current, working_days_current);
    let cost_per_working_day_previous = safe_div(previous, working_days_previous);

    // Per month in the trailing window: the first non-null reading and the metric sum.
    let mut monthly_3m: BTreeMap<&str, (Option<f64>, f64)> = BTreeMap::new();
    for r in &rows_3m {
        let entry = monthly_3m.entry(r.month_key.as_str()).or_insert((None, 0.0));
        if entry.0.is_none() {
            entry.0 = r.working_days;
        }
        entry.1 += metric.value(r);
    }
    let working_days_3m = if monthly_3m.is_empty() {
        DEFAULT_WORKING_DAYS * 3.0
    } else {
        monthly_3m
            .values()
            .map(|(days, _)| days.unwrap_or(DEFAULT_WORKING_DAYS))
            .sum()
    };
    let cost_per_working_day_3m = safe_div(total_3m, working_days_3m);

    let monthly_totals: Vec<f64> = monthly_3m.values().map(|(_, total)| *total).collect();
    let diffs: Vec<f64> = monthly_totals.windows(2).map(|w| w[1] - w[0]).collect();
    let trend = if !diffs.is_empty() && average(&diffs) > 0.0 {
        Trend::Increasing
    } else {
        Trend::Decreasing
    };

    let vehicles = current_rows
        .iter()
        .map(|r| r.plate.as_str())
        .collect::<HashSet<_>>()
        .len();

    Some(PerformanceKpis {
        metric,
        month: current_key,
        current,
        previous,
        diff_previous: current - previous,
        pct_vs_previous: pct_or_zero(current, previous),
        total_3m,
        total_6m,
        total_12m,
        avg_3m,
        avg_6m,
        avg_12m,
        diff_avg_3m: current - avg_3m,
        diff_avg_6m: current - avg_6m,
        diff_avg_12m: current - avg_12m,
        pct_vs_avg_3m: pct_or_zero(current, avg_3m),
        working_days_current,
        working_days_previous,
        cost_per_working_day,
        cost_per_working_day_previous,
        diff_cost_per_working_day: cost_per_working_day - cost_per_working_day_previous,
        working_days_3m,
        cost_per_working_day_3m,
        diff_cost_per_working_day_3m: cost_per_working_day - cost_per_working_day_3m,
        trend,
        vehicles,
        cost_per_vehicle: safe_div(current, vehicles as f64),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stability {
    Stable,
    Moderate,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyPoint {
    pub month: String,
    pub total: f64,
    pub moving_avg_3m: f64,
    pub moving_avg_6m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Variability {
    pub series: Vec<MonthlyPoint>,
    pub coefficient_of_variation: f64,
    pub stability: Stability,
    pub max: f64,
    pub min: f64,
    pub amplitude: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub trend: Trend,
    pub strength: TrendStrength,
}

/// Monthly totals for the 12 months ending at `month`.
pub fn monthly_series(
    history: &[FleetRecord],
    month: &str,
    metric: CostMetric,
) -> Option<Vec<(String, f64)>> {
    let end = parse_month_key(month)?;
    let start = month_key(months_before(end, 11));
    let end = month_key(end);
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for r in history {
        let key = r.month_key.as_str();
        if key >= start.as_str() && key <= end.as_str() {
            *totals.entry(key).or_insert(0.0) += metric.value(r);
        }
    }
    Some(totals.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// The window stops at the selected month; later months never enter the series.
pub fn cost_variability(
    history: &[FleetRecord],
    month: &Selection<String>,
    metric: CostMetric,
) -> Option<Variability> {
    let series = monthly_series(history, month.value()?, metric)?;
    if series.len() < 2 {
        return None;
    }
    let totals: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let ma3 = moving_average(&totals, 3, 1);
    let ma6 = moving_average(&totals, 6, 1);

    let mean = average(&totals);
    let cv = if mean > 0.0 {
        sample_std_dev(&totals) / mean * 100.0
    } else {
        0.0
    };
    let stability = if cv < 15.0 {
        Stability::Stable
    } else if cv < 30.0 {
        Stability::Moderate
    } else {
        Stability::Unstable
    };

    let max = totals.iter().copied().fold(f64::MIN, f64::max);
    let min = totals.iter().copied().fold(f64::MAX, f64::min);
    let (slope, r_squared) = linear_trend(&totals);
    let strength = if r_squared > 0.5 {
        TrendStrength::Strong
    } else if r_squared > 0.2 {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };

    let points = series
        .into_iter()
        .enumerate()
        .map(|(i, (month, total))| MonthlyPoint {
            month,
            total,
            moving_avg_3m: ma3[i].unwrap_or(total),
            moving_avg_6m: ma6[i].unwrap_or(total),
        })
        .collect();

    Some(Variability {
        series: points,
        coefficient_of_variation: cv,
        stability,
        max,
        min,
        amplitude: max - min,
        slope,
        r_squared,
        trend: if slope > 0.0 {
            Trend::Increasing
        } else {
            Trend::Decreasing
        },
        strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, with_fuel};

    fn only_month(m: &str) -> Selection<String> {
        Selection::Only(m.to_string())
    }

    fn history() -> Vec<FleetRecord> {
        vec![
            record("2025-01-01", "AAA0001", 100.0),
            record("2025-02-01", "AAA0001", 200.0),
            record("2025-03-01", "AAA0001", 300.0),
            record("2025-04-01", "AAA0001", 400.0),
            record("2025-04-01", "BBB0002", 100.0),
        ]
    }

    #[test]
    fn all_year_or_month_yields_nothing() {
        let h = history();
        assert!(performance_kpis(&h, &Selection::All, &only_month("2025-04"), CostMetric::FleetTotal).is_none());
        assert!(performance_kpis(&h, &Selection::Only(2025), &Selection::All, CostMetric::FleetTotal).is_none());
        assert!(performance_kpis(&h, &Selection::Only(2025), &only_month("April"), CostMetric::FleetTotal).is_none());
    }

    #[test]
    fn trailing_windows_exclude_current_month() {
        let k = performance_kpis(
            &history(),
            &Selection::Only(2025),
            &only_month("2025-04"),
            CostMetric::FleetTotal,
        )
        .unwrap();
        assert_eq!(k.current, 500.0);
        assert_eq!(k.previous, 300.0);
        assert_eq!(k.diff_previous, 200.0);
        assert_eq!(k.total_3m, 600.0);
        assert_eq!(k.avg_3m, 200.0);
        assert_eq!(k.avg_6m, 100.0);
        assert_eq!(k.avg_12m, 50.0);
        assert!((k.pct_vs_previous - 66.666_666).abs() < 1e-3);
        assert_eq!(k.pct_vs_avg_3m, 150.0);
        assert_eq!(k.trend, Trend::Increasing);
        assert_eq!(k.vehicles, 2);
        assert_eq!(k.cost_per_vehicle, 250.0);
        assert_eq!(k.windows().len(), 4);
    }

    #[test]
    fn working_days_default_to_twenty_two() {
        let mut h = history();
        h[3].working_days = Some(20.0);
        let k = performance_kpis(&h, &Selection::Only(2025), &only_month("2025-04"), CostMetric::FleetTotal)
            .unwrap();
        assert_eq!(k.working_days_current, 20.0);
        assert_eq!(k.cost_per_working_day, 25.0);
        assert_eq!(k.working_days_previous, 22.0);
        assert_eq!(k.working_days_3m, 66.0);

        let k = performance_kpis(&h, &Selection::Only(2025), &only_month("2025-01"), CostMetric::FleetTotal)
            .unwrap();
        assert_eq!(k.working_days_3m, 66.0);
        assert_eq!(k.previous, 0.0);
        assert_eq!(k.pct_vs_previous, 0.0);
        assert_eq!(k.avg_3m, 0.0);
        assert_eq!(k.trend, Trend::Decreasing);
    }

    #[test]
    fn trailing_working_days_skip_missing_first_reading() {
        let mut march_a = record("2025-03-01", "AAA0001", 100.0);
        march_a.working_days = None;
        let mut march_b = record("2025-03-01", "BBB0002", 100.0);
        march_b.working_days = Some(20.0);
        let h = vec![march_a, march_b, record("2025-04-01", "AAA0001", 10.0)];

        let k = performance_kpis(&h, &Selection::Only(2025), &only_month("2025-04"), CostMetric::FleetTotal)
            .unwrap();
        assert_eq!(k.working_days_3m, 20.0);
        assert_eq!(k.cost_per_working_day_3m, 10.0);
    }

    #[test]
    fn metric_selects_cost_column() {
        let h = vec![with_fuel(record("2025-04-01", "AAA0001", 100.0), 40.0, 10.0)];
        let year = Selection::Only(2025);
        let month = only_month("2025-04");
        let fuel = performance_kpis(&h, &year, &month, CostMetric::Fuel).unwrap();
        let maint = performance_kpis(&h, &year, &month, CostMetric::Maintenance).unwrap();
        let total = performance_kpis(&h, &year, &month, CostMetric::FleetTotal).unwrap();
        assert_eq!(fuel.current, 50.0);
        assert_eq!(maint.current, 100.0);
        assert_eq!(total.current, 150.0);
    }

    #[test]
    fn percent_change_sentinels() {
        assert_eq!(percent_change(150.0, 100.0), 50.0);
        assert_eq!(percent_change(10.0, 0.0), 100.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
    }

    #[test]
    fn variability_of_rising_costs() {
        let v = cost_variability(&history(), &only_month("2025-04"), CostMetric::FleetTotal).unwrap();
        assert_eq!(v.series.len(), 4);
        assert_eq!(v.series[0].moving_avg_3m, 100.0);
        assert_eq!(v.series[2].moving_avg_3m, 200.0);
        assert_eq!(v.amplitude, 400.0);
        assert_eq!(v.trend, Trend::Increasing);
        assert_eq!(v.strength, TrendStrength::Strong);
        assert_eq!(v.stability, Stability::Unstable);
    }

    #[test]
    fn variability_needs_two_months() {
        let h = vec![record("2025-04-01", "AAA0001", 100.0)];
        assert!(cost_variability(&h, &only_month("2025-04"), CostMetric::FleetTotal).is_none());
        assert!(cost_variability(&h, &Selection::All, CostMetric::FleetTotal).is_none());
    }

    #[test]
    fn variability_window_ends_at_selected_month() {
        let v = cost_variability(&history(), &only_month("2025-02"), CostMetric::FleetTotal).unwrap();
        assert_eq!(v.series.len(), 2);
        assert_eq!(v.series[1].month, "2025-02");
    }
}
