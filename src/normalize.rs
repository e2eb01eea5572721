//! Category normalization.
//!
//! Every normalizer is an ordered rule table evaluated top to bottom where the
//! first matching rule wins. Several substrings overlap (`"ECT"` also appears
//! inside other contract names), so rule order is part of the behavior. The
//! spreadsheet and database sources both run through these tables.

use tracing::warn;

use crate::types::VehicleGroup;
use crate::util::title_case;

pub const FUEL_GASOLINE: &str = "Gasoline";
pub const FUEL_DIESEL: &str = "Diesel";
pub const NOT_INFORMED: &str = "NOT INFORMED";
pub const CONTRACT_NOT_INFORMED: &str = "Contract Not Informed";
pub const BRANCH_NOT_INFORMED: &str = "Branch Not Informed";
pub const CONTRACT_OTHERS: &str = "Others";

#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    Exact(&'static str),
    AnyExact(&'static [&'static str]),
    Contains(&'static str),
    ContainsAny(&'static [&'static str]),
}

impl Matcher {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(s) => value == *s,
            Matcher::AnyExact(list) => list.iter().any(|s| value == *s),
            Matcher::Contains(s) => value.contains(*s),
            Matcher::ContainsAny(list) => list.iter().any(|s| value.contains(*s)),
        }
    }
}

pub type Rule<T> = (Matcher, T);

/// First label whose matcher accepts `value`.
pub fn first_match<T: Copy>(rules: &[Rule<T>], value: &str) -> Option<T> {
    rules
        .iter()
        .find(|(matcher, _)| matcher.matches(value))
        .map(|(_, label)| *label)
}

/// Exact table first, then the substring fallback.
pub const FUEL_RULES: &[Rule<&str>] = &[
    (Matcher::Exact("GASOLINA"), FUEL_GASOLINE),
    (Matcher::Exact("GASOLINA E ETANOL"), FUEL_GASOLINE),
    (Matcher::Exact("GASOLINAEEETANOL"), FUEL_GASOLINE),
    (Matcher::Exact("ETANOL"), FUEL_GASOLINE),
    (Matcher::Exact("DIESEL"), FUEL_DIESEL),
    (Matcher::Exact("DÍESEL"), FUEL_DIESEL),
    (Matcher::Exact("DIESEL S10"), FUEL_DIESEL),
    (Matcher::Exact("DIESEL S500"), FUEL_DIESEL),
    (Matcher::ContainsAny(&["GASOLINA", "ETANOL"]), FUEL_GASOLINE),
    (Matcher::ContainsAny(&["DIESEL", "DÍESEL"]), FUEL_DIESEL),
];

/// Exact matches only, on the trimmed value as written.
pub const ROUTE_RULES: &[Rule<&str>] = &[
    (Matcher::AnyExact(&["urbano", "Urbano"]), "Urban"),
    (Matcher::AnyExact(&["rodoviário", "Rodoviário"]), "Highway"),
    (
        Matcher::AnyExact(&[
            "urbano e rodoviário",
            "Urbano e Rodoviário",
            "Urbano E Rodoviário",
        ]),
        "Urban and Highway",
    ),
];

/// Runs after the empty/`0`/`NAN` check; anything left over is unclassified.
pub const VEHICLE_GROUP_RULES: &[Rule<VehicleGroup>] = &[
    (
        Matcher::ContainsAny(&["CAMINHÃO", "CAMINHAO", "TRUCK"]),
        VehicleGroup::Truck,
    ),
    (Matcher::Exact("KOMBI"), VehicleGroup::Medium),
    (Matcher::Exact("MOTO"), VehicleGroup::Light),
    (Matcher::Exact("LEVE"), VehicleGroup::Light),
    (Matcher::AnyExact(&["MÉDIO", "MEDIO"]), VehicleGroup::Medium),
    (Matcher::Exact("PESADO"), VehicleGroup::Heavy),
];

pub const CONTRACT_RULES: &[Rule<&str>] = &[
    (Matcher::AnyExact(&["", "NAN", "CONT"]), CONTRACT_NOT_INFORMED),
    (Matcher::Contains("FEBRABAN"), "FEBRABAN"),
    (Matcher::Contains("ECT"), "ECT"),
    (Matcher::Contains("LATAM"), "LATAM"),
    (Matcher::Contains("ADMINISTRATIVO"), "ADMINISTRATIVO"),
    (Matcher::Contains("CARGAS"), "CARGAS"),
    (Matcher::Contains("LEROY"), "LEROY MERLIN"),
    (Matcher::Contains("DHL"), "DHL"),
    (Matcher::Contains("BANCOOB"), "BANCOOB"),
    (Matcher::Contains("BASSO"), "BASSO"),
    (Matcher::Contains("FAHECE"), "FAHECE"),
    (Matcher::Contains("ESTRUTURAL"), "ESTRUTURAL"),
    (Matcher::Contains("OUTRA FILIAL"), "OUTRA FILIAL"),
];

const MISSING_BRANCH: &[&str] = &["", "NAN", "NÃO INFORMADO", NOT_INFORMED];

fn clean_upper(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Unmatched values come back trimmed and upper-cased so spelling variants
/// of the same fuel collapse into one category.
pub fn normalize_fuel_type(raw: &str) -> String {
    let cleaned = clean_upper(raw);
    match first_match(FUEL_RULES, &cleaned) {
        Some(label) => label.to_string(),
        None => cleaned,
    }
}

pub fn normalize_route_type(raw: &str) -> String {
    let trimmed = raw.trim();
    first_match(ROUTE_RULES, trimmed)
        .unwrap_or(trimmed)
        .to_string()
}

pub fn is_missing_group(cleaned: &str) -> bool {
    cleaned.is_empty() || cleaned == "0" || cleaned == "NAN"
}

/// Classification plus whether the value fell through every rule.
pub fn classify_vehicle_group_checked(raw: &str) -> (VehicleGroup, bool) {
    let cleaned = clean_upper(raw);
    if is_missing_group(&cleaned) {
        return (VehicleGroup::Other, false);
    }
    match first_match(VEHICLE_GROUP_RULES, &cleaned) {
        Some(group) => (group, false),
        None => {
            warn!(raw = %raw, cleaned = %cleaned, "Unclassified vehicle group");
            (VehicleGroup::Other, true)
        }
    }
}

pub fn classify_vehicle_group(raw: &str) -> VehicleGroup {
    classify_vehicle_group_checked(raw).0
}

/// Motorcycles are bucketed as Light but keep their own efficiency readings.
pub fn is_motorcycle(raw: &str) -> bool {
    clean_upper(raw) == "MOTO"
}

pub fn contract_program(contract: &str) -> &'static str {
    first_match(CONTRACT_RULES, &clean_upper(contract)).unwrap_or(CONTRACT_OTHERS)
}

/// Grouping key `"{program} - {branch}"` in title case. Two raw contracts that
/// map to the same program and branch share a key.
pub fn group_contract(contract: &str, branch: &str) -> String {
    let program = contract_program(contract);
    let branch = clean_upper(branch);
    let branch = if MISSING_BRANCH.contains(&branch.as_str()) {
        BRANCH_NOT_INFORMED.to_string()
    } else {
        branch
    };
    title_case(&format!("{} - {}", program, branch))
}

pub fn informed_or_sentinel(raw: &str) -> String {
    let cleaned = clean_upper(raw);
    if cleaned.is_empty() || cleaned == "NAN" {
        NOT_INFORMED.to_string()
    } else {
        cleaned
    }
}
