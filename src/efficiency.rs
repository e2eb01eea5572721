//! Fuel-efficiency outlier adjustment.
//!
//! Readings outside the plausible km/l band are replaced with the mean of the
//! same vehicle model's in-band readings instead of being clamped or dropped.
//! Motorcycles are exempt on both sides: their readings are never replaced and
//! never feed the reference means.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::types::FleetRecord;

pub const MIN_KM_PER_LITRE: f64 = 2.5;
pub const MAX_KM_PER_LITRE: f64 = 35.0;

#[derive(Debug, Clone, Default)]
pub struct AdjustmentReport {
    pub adjusted: usize,
    pub global_fallbacks: usize,
    /// Models whose every reading was out of band and borrowed the global mean.
    pub fallback_models: BTreeSet<String>,
}

pub fn in_band(v: f64) -> bool {
    (MIN_KM_PER_LITRE..=MAX_KM_PER_LITRE).contains(&v)
}

/// Per-model means and the global fallback over the valid subset.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMeans {
    pub by_model: HashMap<String, f64>,
    pub global: Option<f64>,
}

impl ReferenceMeans {
    pub fn from_records(records: &[FleetRecord]) -> Self {
        let mut by_model: HashMap<String, (f64, usize)> = HashMap::new();
        let (mut sum, mut count) = (0.0, 0usize);
        for r in records {
            if r.motorcycle {
                continue;
            }
            let Some(v) = r.km_per_litre else { continue };
            if !in_band(v) {
                continue;
            }
            let e = by_model.entry(r.model.clone()).or_insert((0.0, 0));
            e.0 += v;
            e.1 += 1;
            sum += v;
            count += 1;
        }
        let by_model = by_model
            .into_iter()
            .map(|(model, (s, c))| (model, s / c as f64))
            .collect();
        let global = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };
        Self { by_model, global }
    }
}

/// Fill `km_per_litre_adjusted` for every record.
pub fn adjust_efficiency(records: &mut [FleetRecord]) -> AdjustmentReport {
    let means = ReferenceMeans::from_records(records);
    let mut report = AdjustmentReport::default();

    for r in records.iter_mut() {
        r.km_per_litre_adjusted = match r.km_per_litre {
            None => None,
            Some(v) if r.motorcycle => Some(v),
            Some(v) if in_band(v) => Some(v),
            Some(v) => {
                report.adjusted += 1;
                match means.by_model.get(&r.model) {
                    Some(mean) => {
                        debug!(plate = %r.plate, model = %r.model, original = v, replacement = mean, "Efficiency reading replaced");
                        Some(*mean)
                    }
                    None => {
                        report.global_fallbacks += 1;
                        report.fallback_models.insert(r.model.clone());
                        means.global
                    }
                }
            }
        };
    }

    // TODO: models whose readings are all out of band likely have a miscalibrated
    // odometer; surface them in a dedicated report instead of blending them
    // into the fleet-wide mean.
    for model in &report.fallback_models {
        warn!(model = %model, global_mean = ?means.global, "No in-band efficiency readings for model; using fleet-wide mean");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    fn with_reading(model: &str, motorcycle: bool, reading: Option<f64>) -> FleetRecord {
        let mut r = record("2025-01-01", "AAA0001", 100.0);
        r.model = model.to_string();
        r.motorcycle = motorcycle;
        r.km_per_litre = reading;
        r
    }

    #[test]
    fn motorcycle_readings_are_never_replaced() {
        let mut rows = vec![
            with_reading("CG 160", true, Some(999.0)),
            with_reading("STRADA", false, Some(10.0)),
        ];
        adjust_efficiency(&mut rows);
        assert_eq!(rows[0].km_per_litre_adjusted, Some(999.0));
    }

    #[test]
    fn low_reading_takes_model_mean() {
        let mut rows = vec![
            with_reading("STRADA", false, Some(10.0)),
            with_reading("STRADA", false, Some(12.0)),
            with_reading("STRADA", false, Some(1.0)),
            with_reading("HILUX", false, Some(8.0)),
        ];
        let report = adjust_efficiency(&mut rows);
        assert_eq!(rows[2].km_per_litre_adjusted, Some(11.0));
        assert_eq!(report.adjusted, 1);
        assert_eq!(report.global_fallbacks, 0);
    }

    #[test]
    fn model_without_valid_readings_uses_global_mean() {
        let mut rows = vec![
            with_reading("STRADA", false, Some(10.0)),
            with_reading("HILUX", false, Some(8.0)),
            with_reading("ACCELO", false, Some(50.0)),
            // Motorcycles never feed the means.
            with_reading("CG 160", true, Some(30.0)),
        ];
        let report = adjust_efficiency(&mut rows);
        assert_eq!(rows[2].km_per_litre_adjusted, Some(9.0));
        assert_eq!(report.global_fallbacks, 1);
        assert!(report.fallback_models.contains("ACCELO"));
    }

    #[test]
    fn in_band_and_missing_readings_are_kept() {
        let mut rows = vec![
            with_reading("STRADA", false, Some(10.0)),
            with_reading("STRADA", false, None),
            with_reading("STRADA", false, Some(2.5)),
            with_reading("STRADA", false, Some(35.0)),
        ];
        adjust_efficiency(&mut rows);
        assert_eq!(rows[0].km_per_litre_adjusted, Some(10.0));
        assert_eq!(rows[1].km_per_litre_adjusted, None);
        assert_eq!(rows[2].km_per_litre_adjusted, Some(2.5));
        assert_eq!(rows[3].km_per_litre_adjusted, Some(35.0));
    }

    #[test]
    fn no_valid_readings_anywhere_yields_none() {
        let mut rows = vec![with_reading("STRADA", false, Some(0.5))];
        adjust_efficiency(&mut rows);
        assert_eq!(rows[0].km_per_litre_adjusted, None);
    }
}
