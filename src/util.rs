// Utility helpers for parsing, dates and basic statistics.
//
// This module centralizes all the "dirty" spreadsheet/number/date handling so
// the rest of the code can assume clean, typed values.
use chrono::{Duration, Months, NaiveDate};
use num_format::{Locale, ToFormattedString};

use crate::types::Cell;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in spreadsheet exports.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn cell_to_f64(cell: Option<&Cell>) -> Option<f64> {
    match cell? {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Number(_) | Cell::Empty => None,
        Cell::Text(s) => parse_f64_safe(Some(s)),
    }
}

/// Money and distance coercion: unparseable becomes zero.
pub fn cell_to_f64_or_zero(cell: Option<&Cell>) -> f64 {
    cell_to_f64(cell).unwrap_or(0.0)
}

/// Cost coercion: unparseable or negative becomes zero.
pub fn cell_to_cost(cell: Option<&Cell>) -> f64 {
    cell_to_f64_or_zero(cell).max(0.0)
}

pub fn cell_to_i32(cell: Option<&Cell>) -> Option<i32> {
    let v = cell_to_f64(cell)?;
    if v.fract() != 0.0 || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return None;
    }
    Some(v as i32)
}

pub fn cell_to_string(cell: Option<&Cell>) -> String {
    cell.and_then(Cell::as_text)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Excel serial day numbers count from 1899-12-30.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let origin = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    origin.checked_add_signed(Duration::days(serial.floor() as i64))
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // Datetime strings from the database keep only the date part.
    let s = s.split(['T', ' ']).next().unwrap_or(s);
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Some(d);
    }
    // Serial numbers sometimes arrive as text.
    parse_f64_safe(Some(s)).and_then(excel_serial_to_date)
}

pub fn cell_to_date(cell: Option<&Cell>) -> Option<NaiveDate> {
    match cell? {
        Cell::Number(n) => excel_serial_to_date(*n),
        Cell::Text(s) => parse_date_safe(Some(s)),
        Cell::Empty => None,
    }
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// First day of the month named by a `YYYY-MM` key.
pub fn parse_month_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", key.trim()), "%Y-%m-%d").ok()
}

pub fn months_before(date: NaiveDate, n: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(n)).unwrap_or(date)
}

/// Trim and collapse internal whitespace runs (double spaces in headers).
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case a phrase: the first letter of every alphabetic run is upper
/// case and the rest lower case, so `"DHL - SÃO PAULO"` becomes
/// `"Dhl - São Paulo"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Ratio that reports 0 instead of dividing by a non-positive denominator.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        let r = num / den;
        if r.is_finite() {
            return r;
        }
    }
    0.0
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn mean_opt(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        None
    } else {
        Some(average(v))
    }
}

/// Sample standard deviation (n - 1); 0 for fewer than two values.
pub fn sample_std_dev(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let mean = average(v);
    let ss: f64 = v.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (v.len() - 1) as f64).sqrt()
}

/// Least-squares fit of `v` against `0..n`; returns `(slope, r_squared)`.
pub fn linear_trend(v: &[f64]) -> (f64, f64) {
    let n = v.len();
    if n < 2 {
        return (0.0, 0.0);
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let mx = average(&xs);
    let my = average(v);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(v) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let r_squared = if sxx > 0.0 && syy > 0.0 {
        (sxy * sxy) / (sxx * syy)
    } else {
        0.0
    };
    (slope, r_squared)
}

/// Trailing moving average over `window` values, reporting a value as soon as
/// `min_periods` values are available.
pub fn moving_average(v: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    (0..v.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &v[start..=i];
            if slice.len() >= min_periods.max(1) {
                Some(average(slice))
            } else {
                None
            }
        })
        .collect()
}

/// 1-based "min" ranking: ties share the lowest rank of their group.
pub fn min_rank(values: &[f64], descending: bool) -> Vec<usize> {
    values
        .iter()
        .map(|v| {
            let better = values
                .iter()
                .filter(|o| if descending { *o > v } else { *o < v })
                .count();
            better + 1
        })
        .collect()
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    // First, format to a plain fixed-decimal string like `1234567.89`.
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Use `num-format` to insert commas into the integer portion.
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for integer-like values. This is used
    // for counts in console messages (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

/// Currency rendering used by the card and table previews.
pub fn format_money(n: f64) -> String {
    format!("R$ {}", format_number(n, 2))
}

pub fn display_money(n: &f64) -> String {
    format_money(*n)
}

pub fn display_decimal(n: &f64) -> String {
    format_number(*n, 2)
}

pub fn display_opt(n: &Option<f64>) -> String {
    n.map(|v| format_number(v, 2))
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn display_count_opt(n: &Option<usize>) -> String {
    n.map(format_int).unwrap_or_else(|| "-".to_string())
}
