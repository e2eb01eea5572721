//! Turns raw source tables into clean `FleetRecord`s.
//!
//! Order matters: joins, numeric coercion, derived totals, category
//! normalization, efficiency adjustment, then the not-informed sentinel.
use chrono::Datelike;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::efficiency::adjust_efficiency;
use crate::error::{Error, Result};
use crate::normalize::{
    classify_vehicle_group_checked, group_contract, informed_or_sentinel, is_motorcycle,
    normalize_fuel_type, normalize_route_type,
};
use crate::types::{Cell, FleetRecord, LoadReport, RawTable, SourceTables, VehicleGroup};
use crate::util::{
    cell_to_cost, cell_to_date, cell_to_f64, cell_to_f64_or_zero, cell_to_i32, cell_to_string,
    month_key,
};

pub mod columns {
    pub const PLATE: &str = "Placa";
    pub const MODEL: &str = "Modelo";
    pub const BRAND: &str = "Marca";
    pub const GROUP: &str = "GrupoCorreto";
    pub const BRANCH_ID: &str = "ID Filial";
    pub const CONTRACT: &str = "Contrato";
    pub const FUEL_TYPE: &str = "TP.Comb";
    pub const ROUTE_TYPE: &str = "TP.Rota";
    pub const MONTH: &str = "Mês";
    pub const BODYWORK: &str = "Lataria e Pintura";
    pub const MAINTENANCE: &str = "Manutenção";
    pub const TIRES: &str = "Rodas / Pneus";
    pub const FUEL: &str = "Valor Comb.";
    pub const UREA: &str = "Arla";
    pub const KM_START: &str = "Km Inicial";
    pub const KM_END: &str = "Km Final";
    pub const TOTAL_KM: &str = "Total de Km";
    pub const TOTAL_KM_ALT: &str = "Total de KM";
    pub const KM_PER_LITRE: &str = "Média Km/l";
    pub const FUEL_PER_KM: &str = "Comb / Km";
    pub const LITRES: &str = "Litros Comb.";
    pub const MAINTENANCE_PER_KM: &str = "Man / Km";
    pub const WORKING_DAYS: &str = "Dias Úteis";
    pub const DUC: &str = "DUC";
    pub const DUK: &str = "DUK";
    pub const DUL: &str = "DUL";
    pub const MAIN_ROUTE: &str = "Roteiro Principal";
    pub const MAIN_DRIVER: &str = "Motorista Principal";

    // Registries
    pub const MODEL_YEAR: &str = "Ano";
    pub const BRANCH_NAME: &str = "Filial";
    pub const REGION: &str = "Regiao";
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Keep only rows from this year.
    pub restrict_year: Option<i32>,
    /// Year used to compute vehicle age.
    pub reference_year: i32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            restrict_year: None,
            reference_year: chrono::Local::now().year(),
        }
    }
}

/// Looks up cells by normalized column name; absent columns read as `None`.
struct RowView<'a> {
    index: &'a HashMap<String, usize>,
    row: &'a [Cell],
}

impl<'a> RowView<'a> {
    fn get(&self, column: &str) -> Option<&'a Cell> {
        self.index.get(column).and_then(|i| self.row.get(*i))
    }

    fn text(&self, column: &str) -> String {
        cell_to_string(self.get(column))
    }
}

fn require(table: &RawTable, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(Error::MissingColumn {
            table: table.name.clone(),
            column: column.to_string(),
        })
    }
}

/// plate → model year
fn fleet_lookup(fleet: &RawTable) -> Result<HashMap<String, Option<i32>>> {
    require(fleet, columns::PLATE)?;
    let index = fleet.column_index();
    let mut map = HashMap::new();
    for row in &fleet.rows {
        let view = RowView { index: &index, row };
        if let Some(key) = view.get(columns::PLATE).and_then(Cell::as_key) {
            // Left join keeps the first registry entry per plate.
            map.entry(key)
                .or_insert_with(|| cell_to_i32(view.get(columns::MODEL_YEAR)));
        }
    }
    Ok(map)
}

/// branch id → (standardized name, region)
fn branch_lookup(branches: &RawTable) -> Result<HashMap<String, (String, String)>> {
    require(branches, columns::BRANCH_ID)?;
    let index = branches.column_index();
    let mut map = HashMap::new();
    for row in &branches.rows {
        let view = RowView { index: &index, row };
        if let Some(key) = view.get(columns::BRANCH_ID).and_then(Cell::as_key) {
            map.entry(key).or_insert_with(|| {
                (view.text(columns::BRANCH_NAME), view.text(columns::REGION))
            });
        }
    }
    Ok(map)
}

pub fn build_records(
    tables: &SourceTables,
    options: &PipelineOptions,
) -> Result<(Vec<FleetRecord>, LoadReport)> {
    let tx = &tables.transactions;
    require(tx, columns::PLATE)?;
    require(tx, columns::MONTH)?;

    let fleet = tables.fleet.as_ref().map(fleet_lookup).transpose()?;
    let branches = tables.branches.as_ref().map(branch_lookup).transpose()?;

    let index = tx.column_index();
    let has_total_km = tx.has_column(columns::TOTAL_KM);
    let has_total_km_alt = tx.has_column(columns::TOTAL_KM_ALT);
    let has_group = tx.has_column(columns::GROUP);
    let has_fuel_type = tx.has_column(columns::FUEL_TYPE);
    let has_route_type = tx.has_column(columns::ROUTE_TYPE);
    let has_contract = tx.has_column(columns::CONTRACT);
    let has_branch_source = branches.is_some() || tx.has_column(columns::BRANCH_NAME);
    // Outlier replacement needs the model and group to build its reference means.
    let can_adjust = tx.has_column(columns::MODEL) && has_group;

    let mut report = LoadReport {
        total_rows: tx.rows.len(),
        ..LoadReport::default()
    };
    let mut records = Vec::with_capacity(tx.rows.len());

    for row in &tx.rows {
        let view = RowView { index: &index, row };

        let Some(date) = cell_to_date(view.get(columns::MONTH)) else {
            report.missing_dates += 1;
            continue;
        };
        if let Some(year) = options.restrict_year {
            if date.year() != year {
                report.outside_restricted_year += 1;
                continue;
            }
        }

        let plate = view.text(columns::PLATE);
        let plate_key = view.get(columns::PLATE).and_then(Cell::as_key);

        let model_year = match &fleet {
            Some(lookup) => match plate_key.as_ref().and_then(|k| lookup.get(k)) {
                Some(year) => *year,
                None => {
                    report.unmatched_fleet += 1;
                    None
                }
            },
            None => cell_to_i32(view.get(columns::MODEL_YEAR)),
        };

        let (branch, region) = match &branches {
            Some(lookup) => {
                let key = view.get(columns::BRANCH_ID).and_then(Cell::as_key);
                match key.as_ref().and_then(|k| lookup.get(k)) {
                    Some((name, region)) => (name.clone(), region.clone()),
                    None => {
                        report.unmatched_branches += 1;
                        (String::new(), String::new())
                    }
                }
            }
            None => (view.text(columns::BRANCH_NAME), view.text(columns::REGION)),
        };

        let bodywork_cost = cell_to_cost(view.get(columns::BODYWORK));
        let general_maintenance_cost = cell_to_cost(view.get(columns::MAINTENANCE));
        let tire_cost = cell_to_cost(view.get(columns::TIRES));
        let fuel_cost = cell_to_cost(view.get(columns::FUEL));
        let urea_cost = cell_to_cost(view.get(columns::UREA));
        let maintenance_total = bodywork_cost + general_maintenance_cost + tire_cost;
        let fuel_total = fuel_cost + urea_cost;

        let km_start = cell_to_f64_or_zero(view.get(columns::KM_START));
        let km_end = cell_to_f64_or_zero(view.get(columns::KM_END));
        let km_driven = (km_end - km_start).max(0.0);
        let total_km = if has_total_km {
            cell_to_f64(view.get(columns::TOTAL_KM)).unwrap_or(km_driven)
        } else if has_total_km_alt {
            cell_to_f64_or_zero(view.get(columns::TOTAL_KM_ALT))
        } else {
            km_driven
        };
        let total_km = total_km.max(0.0);

        let raw_group = view.text(columns::GROUP);
        let (vehicle_group, unclassified) = if has_group {
            classify_vehicle_group_checked(&raw_group)
        } else {
            (VehicleGroup::Other, false)
        };
        if unclassified {
            report.unclassified_groups += 1;
        }

        let raw_fuel = view.text(columns::FUEL_TYPE);
        let raw_route = view.text(columns::ROUTE_TYPE);
        let raw_contract = view.text(columns::CONTRACT);

        records.push(FleetRecord {
            date,
            year: date.year(),
            month_key: month_key(date),
            plate,
            model: view.text(columns::MODEL),
            brand: view.text(columns::BRAND),
            vehicle_group,
            motorcycle: is_motorcycle(&raw_group),
            contract_group: (has_contract && has_branch_source)
                .then(|| group_contract(&raw_contract, &branch)),
            region: informed_or_sentinel(&region),
            branch: informed_or_sentinel(&branch),
            contract: informed_or_sentinel(&raw_contract),
            fuel_type: if has_fuel_type {
                normalize_fuel_type(&raw_fuel)
            } else {
                raw_fuel
            },
            route_type: if has_route_type {
                normalize_route_type(&raw_route)
            } else {
                raw_route
            },
            main_route: view.text(columns::MAIN_ROUTE),
            main_driver: view.text(columns::MAIN_DRIVER),
            model_year,
            age: model_year.map(|y| options.reference_year - y),
            bodywork_cost,
            general_maintenance_cost,
            tire_cost,
            fuel_cost,
            urea_cost,
            maintenance_total,
            fuel_total,
            fleet_total: maintenance_total + fuel_total,
            km_start,
            km_end,
            km_driven,
            total_km,
            litres: cell_to_f64_or_zero(view.get(columns::LITRES)),
            fuel_cost_per_km: cell_to_f64_or_zero(view.get(columns::FUEL_PER_KM)),
            maintenance_per_km: cell_to_f64(view.get(columns::MAINTENANCE_PER_KM)),
            km_per_litre: cell_to_f64(view.get(columns::KM_PER_LITRE)),
            km_per_litre_adjusted: None,
            working_days: cell_to_f64(view.get(columns::WORKING_DAYS)).filter(|d| *d > 0.0),
            duc: cell_to_f64_or_zero(view.get(columns::DUC)),
            duk: cell_to_f64_or_zero(view.get(columns::DUK)),
            dul: cell_to_f64_or_zero(view.get(columns::DUL)),
        });
    }

    if can_adjust {
        let adjustment = adjust_efficiency(&mut records);
        report.adjusted_efficiency = adjustment.adjusted;
        report.global_fallbacks = adjustment.global_fallbacks;
    } else {
        warn!(table = %tx.name, "Model or group column missing; efficiency readings left as reported");
        for r in records.iter_mut() {
            r.km_per_litre_adjusted = r.km_per_litre;
        }
    }
    report.kept_rows = records.len();

    debug!(?report, "Pipeline finished");
    info!(
        total = report.total_rows,
        kept = report.kept_rows,
        missing_dates = report.missing_dates,
        unclassified_groups = report.unclassified_groups,
        adjusted_efficiency = report.adjusted_efficiency,
        "Fleet table built"
    );

    Ok((records, report))
}
