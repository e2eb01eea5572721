//! Filter parameters for one render cycle.
//!
//! Built once from user input and passed explicitly into every computation;
//! nothing downstream reads selection state from anywhere else.
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::types::FleetRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Selection<T> {
    All,
    Only(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: PartialEq> Selection<T> {
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(v) => v == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Selection::All => None,
            Selection::Only(v) => Some(v),
        }
    }
}

impl<T> From<Option<T>> for Selection<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Selection::Only(v),
            None => Selection::All,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Selection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("All"),
            Selection::Only(v) => v.fmt(f),
        }
    }
}

/// `"All"` (any case) or empty means no filter.
impl<T: FromStr> FromStr for Selection<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(Selection::All)
        } else {
            s.parse().map(Selection::Only)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterParams {
    pub year: Selection<i32>,
    /// `YYYY-MM`
    pub month: Selection<String>,
    pub region: Selection<String>,
    pub branch: Selection<String>,
    pub fuel_type: Selection<String>,
}

impl FilterParams {
    pub fn matches(&self, r: &FleetRecord) -> bool {
        self.year.accepts(&r.year)
            && self.month.accepts(&r.month_key)
            && self.region.accepts(&r.region)
            && self.branch.accepts(&r.branch)
            && self.fuel_type.accepts(&r.fuel_type)
    }

    pub fn apply(&self, records: &[FleetRecord]) -> Vec<FleetRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }

    /// Active filters as `"Year 2025, Region SUL"`, or `None` when unfiltered.
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Selection::Only(y) = &self.year {
            parts.push(format!("Year {}", y));
        }
        if let Selection::Only(m) = &self.month {
            parts.push(format!("Month {}", m));
        }
        if let Selection::Only(r) = &self.region {
            parts.push(format!("Region {}", r));
        }
        if let Selection::Only(b) = &self.branch {
            parts.push(format!("Branch {}", b));
        }
        if let Selection::Only(f) = &self.fuel_type {
            parts.push(format!("Fuel {}", f));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Years present, newest first.
pub fn available_years(records: &[FleetRecord]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().map(|r| r.year).collect();
    years.into_iter().rev().collect()
}

/// Months present within the selected year, oldest first. Months are only
/// offered once a year is chosen.
pub fn available_months(records: &[FleetRecord], year: &Selection<i32>) -> Vec<String> {
    if year.is_all() {
        return Vec::new();
    }
    let months: BTreeSet<&str> = records
        .iter()
        .filter(|r| year.accepts(&r.year))
        .map(|r| r.month_key.as_str())
        .collect();
    months.into_iter().map(str::to_string).collect()
}

pub fn available_regions(records: &[FleetRecord]) -> Vec<String> {
    let regions: BTreeSet<&str> = records.iter().map(|r| r.region.as_str()).collect();
    regions.into_iter().map(str::to_string).collect()
}

/// Branches within the selected region.
pub fn available_branches(records: &[FleetRecord], region: &Selection<String>) -> Vec<String> {
    let branches: BTreeSet<&str> = records
        .iter()
        .filter(|r| region.accepts(&r.region))
        .map(|r| r.branch.as_str())
        .collect();
    branches.into_iter().map(str::to_string).collect()
}

pub fn available_fuel_types(records: &[FleetRecord]) -> Vec<String> {
    let fuels: BTreeSet<&str> = records.iter().map(|r| r.fuel_type.as_str()).collect();
    fuels.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    fn data() -> Vec<FleetRecord> {
        let mut a = record("2024-12-01", "AAA0001", 10.0);
        a.region = "NORTE".into();
        a.branch = "BELEM".into();
        let b = record("2025-01-01", "BBB0002", 20.0);
        let mut c = record("2025-02-01", "CCC0003", 30.0);
        c.fuel_type = "Gasoline".into();
        vec![a, b, c]
    }

    #[test]
    fn default_filters_keep_everything() {
        assert_eq!(FilterParams::default().apply(&data()).len(), 3);
        assert_eq!(FilterParams::default().describe(), None);
    }

    #[test]
    fn filters_combine() {
        let f = FilterParams {
            year: Selection::Only(2025),
            fuel_type: Selection::Only("Diesel".into()),
            ..FilterParams::default()
        };
        let out = f.apply(&data());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].plate, "BBB0002");
        assert_eq!(f.describe().as_deref(), Some("Year 2025, Fuel Diesel"));
    }

    #[test]
    fn parses_selection() {
        assert_eq!("All".parse::<Selection<i32>>().unwrap(), Selection::All);
        assert_eq!(" 2025 ".parse::<Selection<i32>>().unwrap(), Selection::Only(2025));
        assert!("20x5".parse::<Selection<i32>>().is_err());
    }

    #[test]
    fn option_lists() {
        let d = data();
        assert_eq!(available_years(&d), vec![2025, 2024]);
        assert!(available_months(&d, &Selection::All).is_empty());
        assert_eq!(
            available_months(&d, &Selection::Only(2025)),
            vec!["2025-01".to_string(), "2025-02".to_string()]
        );
        assert_eq!(available_regions(&d), vec!["NORTE".to_string(), "SUL".to_string()]);
        assert_eq!(
            available_branches(&d, &Selection::Only("NORTE".into())),
            vec!["BELEM".to_string()]
        );
        assert_eq!(available_fuel_types(&d), vec!["Diesel".to_string(), "Gasoline".to_string()]);
    }
}
