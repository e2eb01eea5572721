use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tabled::Tabled;

use crate::util::{display_count_opt, display_decimal, display_money, display_opt};

/// A single spreadsheet/database cell after it has left the source format.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Text view of the cell. Whole numbers render without a fractional part
    /// so numeric plate/branch ids join against their text counterparts.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }

    pub fn as_key(&self) -> Option<String> {
        self.as_text()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
    }
}

/// Header row plus data rows, with header names already normalized.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    pub fn column_index(&self) -> HashMap<String, usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

/// Tables pulled from one source before joins and cleaning.
///
/// The database path joins the registries server-side, so `fleet` and
/// `branches` are `None` there and the transaction table already carries
/// `Ano`, `Filial` and `Regiao`.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub transactions: RawTable,
    pub fleet: Option<RawTable>,
    pub branches: Option<RawTable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VehicleGroup {
    Light,
    Medium,
    Heavy,
    Truck,
    Other,
}

impl VehicleGroup {
    pub fn label(&self) -> &'static str {
        match self {
            VehicleGroup::Light => "Light",
            VehicleGroup::Medium => "Medium",
            VehicleGroup::Heavy => "Heavy",
            VehicleGroup::Truck => "Truck",
            VehicleGroup::Other => "Other",
        }
    }
}

impl fmt::Display for VehicleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetRecord {
    pub date: NaiveDate,
    pub year: i32,
    /// `YYYY-MM`
    pub month_key: String,
    pub plate: String,
    pub model: String,
    pub brand: String,
    pub vehicle_group: VehicleGroup,
    pub motorcycle: bool,
    pub region: String,
    pub branch: String,
    pub contract: String,
    /// `None` when the source has no contract column or no branch source.
    pub contract_group: Option<String>,
    pub fuel_type: String,
    pub route_type: String,
    pub main_route: String,
    pub main_driver: String,
    pub model_year: Option<i32>,
    pub age: Option<i32>,

    pub bodywork_cost: f64,
    pub general_maintenance_cost: f64,
    pub tire_cost: f64,
    pub fuel_cost: f64,
    pub urea_cost: f64,
    pub maintenance_total: f64,
    pub fuel_total: f64,
    pub fleet_total: f64,

    pub km_start: f64,
    pub km_end: f64,
    pub km_driven: f64,
    pub total_km: f64,
    pub litres: f64,
    pub fuel_cost_per_km: f64,
    pub maintenance_per_km: Option<f64>,
    pub km_per_litre: Option<f64>,
    pub km_per_litre_adjusted: Option<f64>,

    pub working_days: Option<f64>,
    pub duc: f64,
    pub duk: f64,
    pub dul: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub missing_dates: usize,
    pub unmatched_fleet: usize,
    pub unmatched_branches: usize,
    pub outside_restricted_year: usize,
    pub unclassified_groups: usize,
    pub adjusted_efficiency: usize,
    pub global_fallbacks: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct AnnualSummaryRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub label: String,
    #[serde(rename = "Projected")]
    #[tabled(skip)]
    pub projected: bool,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost", display_with = "display_money")]
    pub total_cost: f64,
    #[serde(rename = "TotalKm")]
    #[tabled(rename = "TotalKm", display_with = "display_decimal")]
    pub total_km: f64,
    #[serde(rename = "AvgKmPerLitre")]
    #[tabled(rename = "AvgKm/L", display_with = "display_opt")]
    pub avg_km_per_litre: Option<f64>,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "Cost/Km", display_with = "display_money")]
    pub cost_per_km: f64,
    #[serde(rename = "KmPerVehicle")]
    #[tabled(rename = "Km/Vehicle", display_with = "display_decimal")]
    pub km_per_vehicle: f64,
    #[serde(rename = "CostPerWorkingDay")]
    #[tabled(rename = "Cost/WorkingDay", display_with = "display_money")]
    pub cost_per_working_day: f64,
    #[serde(rename = "CostPerVehicle")]
    #[tabled(rename = "Cost/Vehicle", display_with = "display_money")]
    pub cost_per_vehicle: f64,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CategoryComparisonRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Period")]
    #[tabled(rename = "Period")]
    pub period: String,
    #[serde(rename = "Current")]
    #[tabled(rename = "Current", display_with = "display_money")]
    pub current: f64,
    #[serde(rename = "Previous")]
    #[tabled(rename = "Previous", display_with = "display_money")]
    pub previous: f64,
    #[serde(rename = "DeltaPct")]
    #[tabled(rename = "Delta%", display_with = "display_decimal")]
    pub delta_pct: f64,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct VehicleGroupRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: VehicleGroup,
    #[serde(rename = "Vehicles")]
    #[tabled(rename = "Vehicles")]
    pub vehicles: usize,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost", display_with = "display_money")]
    pub total_cost: f64,
    #[serde(rename = "AvgCostPerVehicle")]
    #[tabled(rename = "Avg/Vehicle", display_with = "display_money")]
    pub avg_cost_per_vehicle: f64,
    #[serde(rename = "TotalKm")]
    #[tabled(rename = "TotalKm", display_with = "display_decimal")]
    pub total_km: f64,
    #[serde(rename = "KmPerVehicle")]
    #[tabled(rename = "Km/Vehicle", display_with = "display_decimal")]
    pub km_per_vehicle: f64,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "Cost/Km", display_with = "display_money")]
    pub cost_per_km: f64,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct BranchPanoramaRow {
    #[serde(rename = "Branch")]
    #[tabled(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost", display_with = "display_money")]
    pub total_cost: f64,
    #[serde(rename = "Maintenance")]
    #[tabled(skip)]
    pub general_maintenance: f64,
    #[serde(rename = "Fuel")]
    #[tabled(skip)]
    pub fuel: f64,
    #[serde(rename = "Bodywork")]
    #[tabled(skip)]
    pub bodywork: f64,
    #[serde(rename = "Tires")]
    #[tabled(skip)]
    pub tires: f64,
    #[serde(rename = "Urea")]
    #[tabled(skip)]
    pub urea: f64,
    #[serde(rename = "Vehicles")]
    #[tabled(rename = "Vehicles")]
    pub vehicles: usize,
    #[serde(rename = "TotalKm")]
    #[tabled(rename = "TotalKm", display_with = "display_decimal")]
    pub total_km: f64,
    #[serde(rename = "WorkingDays")]
    #[tabled(skip)]
    pub working_days: f64,
    #[serde(rename = "AvgKmPerLitre")]
    #[tabled(rename = "Km/L", display_with = "display_decimal")]
    pub avg_km_per_litre: f64,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "Cost/Km", display_with = "display_money")]
    pub cost_per_km: f64,
    #[serde(rename = "KmPerVehicle")]
    #[tabled(skip)]
    pub km_per_vehicle: f64,
    #[serde(rename = "CostPerWorkingDay")]
    #[tabled(skip)]
    pub cost_per_working_day: f64,
    #[serde(rename = "TicketPerVehicle")]
    #[tabled(rename = "Ticket/Vehicle", display_with = "display_money")]
    pub ticket_per_vehicle: f64,
    #[serde(rename = "MainGroup")]
    #[tabled(rename = "MainGroup")]
    pub main_group: String,
    #[serde(rename = "RankTotalCost")]
    #[tabled(skip)]
    pub rank_total_cost: usize,
    #[serde(rename = "RankCostPerKm")]
    #[tabled(skip)]
    pub rank_cost_per_km: usize,
    #[serde(rename = "RankEfficiency")]
    #[tabled(skip)]
    pub rank_efficiency: usize,
    #[serde(rename = "RankFleet")]
    #[tabled(skip)]
    pub rank_fleet: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchHighlight {
    pub branch: String,
    pub value: f64,
    /// Potential savings, margin over the worst branch, or share of total,
    /// depending on the highlight.
    pub detail: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BranchInsights {
    pub most_efficient: Option<BranchHighlight>,
    pub best_fuel_efficiency: Option<BranchHighlight>,
    pub largest_fleet: Option<BranchHighlight>,
    pub largest_operation: Option<BranchHighlight>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MonthlyTrendRow {
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost", display_with = "display_money")]
    pub total_cost: f64,
    #[serde(rename = "Maintenance")]
    #[tabled(rename = "Maintenance", display_with = "display_money")]
    pub maintenance: f64,
    #[serde(rename = "Fuel")]
    #[tabled(rename = "Fuel", display_with = "display_money")]
    pub fuel: f64,
    #[serde(rename = "TotalKm")]
    #[tabled(rename = "TotalKm", display_with = "display_decimal")]
    pub total_km: f64,
    #[serde(rename = "Vehicles")]
    #[tabled(rename = "Vehicles")]
    pub vehicles: usize,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "Cost/Km", display_with = "display_money")]
    pub cost_per_km: f64,
    #[serde(rename = "CostPerKmMovingAvg3")]
    #[tabled(rename = "Cost/Km MA3", display_with = "display_opt")]
    pub cost_per_km_ma3: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct VehicleDetailRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Plate")]
    #[tabled(rename = "Plate")]
    pub plate: String,
    #[serde(rename = "Model")]
    #[tabled(rename = "Model")]
    pub model: String,
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: VehicleGroup,
    #[serde(rename = "Brand")]
    #[tabled(skip)]
    pub brand: String,
    #[serde(rename = "FuelType")]
    #[tabled(skip)]
    pub fuel_type: String,
    #[serde(rename = "RouteType")]
    #[tabled(skip)]
    pub route_type: String,
    #[serde(rename = "Contract")]
    #[tabled(skip)]
    pub contract: String,
    #[serde(rename = "MainRoute")]
    #[tabled(skip)]
    pub main_route: String,
    #[serde(rename = "MainDriver")]
    #[tabled(skip)]
    pub main_driver: String,
    #[serde(rename = "Region")]
    #[tabled(skip)]
    pub region: String,
    #[serde(rename = "Branch")]
    #[tabled(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "Fuel")]
    #[tabled(skip)]
    pub fuel: f64,
    #[serde(rename = "Urea")]
    #[tabled(skip)]
    pub urea: f64,
    #[serde(rename = "GeneralMaintenance")]
    #[tabled(skip)]
    pub general_maintenance: f64,
    #[serde(rename = "Tires")]
    #[tabled(skip)]
    pub tires: f64,
    #[serde(rename = "Bodywork")]
    #[tabled(skip)]
    pub bodywork: f64,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost", display_with = "display_money")]
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MacroSplit {
    pub maintenance: f64,
    pub fuel_and_urea: f64,
    pub total: f64,
    pub maintenance_pct: f64,
    pub fuel_and_urea_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationalKpis {
    pub avg_km_per_litre: Option<f64>,
    pub best_efficiency_vehicle: Option<String>,
    pub best_efficiency_value: Option<f64>,
    pub worst_efficiency_vehicle: Option<String>,
    pub worst_efficiency_value: Option<f64>,
    pub cost_per_km: f64,
    pub avg_km_per_vehicle: Option<f64>,
    pub fleet_total_km: f64,
    pub top_distance_vehicle: Option<String>,
    pub top_distance_km: Option<f64>,
    pub avg_working_days: f64,
    pub total_working_days: f64,
    pub cost_per_working_day: f64,
    pub contract_diversity: usize,
    pub costliest_contract: Option<String>,
    pub costliest_contract_cost: Option<f64>,
    pub costliest_contract_share_pct: Option<f64>,
    pub most_active_contract: Option<String>,
    pub most_active_contract_vehicles: Option<usize>,
    pub most_active_contract_fleet_pct: Option<f64>,
    pub avg_maintenance_per_km: f64,
    pub most_efficient_region: Option<String>,
    pub most_efficient_region_cost_per_km: Option<f64>,
}

/// Headline counts written to `summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub total_vehicles: usize,
    pub total_branches: usize,
    pub total_regions: usize,
    pub total_months: usize,
    pub total_cost: f64,
    pub total_km: f64,
    pub split: MacroSplit,
}

/// Shared with the KPI module; exported as one row per trailing window.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct WindowRow {
    #[serde(rename = "Window")]
    #[tabled(rename = "Window")]
    pub window: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total", display_with = "display_money")]
    pub total: f64,
    #[serde(rename = "MonthlyAverage")]
    #[tabled(rename = "Monthly Avg", display_with = "display_money")]
    pub monthly_average: f64,
    #[serde(rename = "DiffVsCurrent")]
    #[tabled(rename = "Diff vs Current", display_with = "display_money")]
    pub diff_vs_current: f64,
    #[serde(rename = "Months")]
    #[tabled(rename = "Months", display_with = "display_count_opt")]
    pub months_with_data: Option<usize>,
}
