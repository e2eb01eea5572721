use crate::filters::Selection;
use crate::kpi::percent_change;
use crate::types::{
    AnnualSummaryRow, BranchHighlight, BranchInsights, BranchPanoramaRow, CategoryComparisonRow,
    FleetRecord, MacroSplit, MonthlyTrendRow, OperationalKpis, SummaryStats, VehicleDetailRow,
    VehicleGroup, VehicleGroupRow,
};
use crate::util::{average, mean_opt, min_rank, month_key, moving_average, months_before, safe_div};
use chrono::Datelike;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Cost categories shown on the comparison cards, in display order.
pub const COST_CATEGORIES: [(&str, fn(&FleetRecord) -> f64); 5] = [
    ("Fuel", |r| r.fuel_cost),
    ("Maintenance", |r| r.general_maintenance_cost),
    ("Tires", |r| r.tire_cost),
    ("Bodywork", |r| r.bodywork_cost),
    ("Urea", |r| r.urea_cost),
];

fn distinct_plates<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a FleetRecord>,
{
    records
        .into_iter()
        .map(|r| r.plate.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Sum of the first working-day reading of each month; months without one
/// contribute nothing.
fn working_days_by_month<'a, I>(records: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a FleetRecord>,
{
    let mut months: BTreeMap<String, Option<f64>> = BTreeMap::new();
    for r in records {
        let slot = months.entry(r.month_key.clone()).or_insert(None);
        if slot.is_none() {
            *slot = r.working_days;
        }
    }
    months
        .into_iter()
        .map(|(k, v)| (k, v.unwrap_or(0.0)))
        .collect()
}

fn adjusted_efficiency_mean<'a, I>(records: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a FleetRecord>,
{
    let values: Vec<f64> = records
        .into_iter()
        .filter_map(|r| r.km_per_litre_adjusted)
        .collect();
    mean_opt(&values)
}

/// Last calendar month with data in a year (1-12), 12 when unknown.
fn last_month_with_data(records: &[&FleetRecord]) -> u32 {
    records
        .iter()
        .map(|r| r.date.month())
        .max()
        .filter(|m| *m > 0)
        .unwrap_or(12)
}

/// Years shown on the annual cards: the selected one, or the three latest.
fn years_to_show(all: &[FleetRecord], year: &Selection<i32>) -> Vec<i32> {
    match year {
        Selection::Only(y) => vec![*y],
        Selection::All => {
            let years: Vec<i32> = all
                .iter()
                .map(|r| r.year)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let skip = years.len().saturating_sub(3);
            years.into_iter().skip(skip).collect()
        }
    }
}

fn latest_year(all: &[FleetRecord]) -> Option<i32> {
    all.iter().map(|r| r.year).max()
}

/// Annual cards plus a full-year projection of `projection_year` (the latest
/// year in the data when `None`). The projection only appears when that year
/// is among the years shown.
pub fn annual_summary(
    all: &[FleetRecord],
    year: &Selection<i32>,
    projection_year: Option<i32>,
) -> Vec<AnnualSummaryRow> {
    if all.is_empty() {
        return Vec::new();
    }
    let years = years_to_show(all, year);
    let mut rows = Vec::new();
    for y in &years {
        let rs: Vec<&FleetRecord> = all.iter().filter(|r| r.year == *y).collect();
        let total_cost: f64 = rs.iter().map(|r| r.fleet_total).sum();
        let total_km: f64 = rs.iter().map(|r| r.total_km).sum();
        let vehicles = distinct_plates(rs.iter().copied()) as f64;
        let working_days: f64 = working_days_by_month(rs.iter().copied()).values().sum();
        rows.push(AnnualSummaryRow {
            label: y.to_string(),
            projected: false,
            total_cost,
            total_km,
            avg_km_per_litre: adjusted_efficiency_mean(rs.iter().copied()),
            cost_per_km: safe_div(total_cost, total_km),
            km_per_vehicle: safe_div(total_km, vehicles),
            cost_per_working_day: safe_div(total_cost, working_days),
            cost_per_vehicle: safe_div(total_cost, vehicles),
        });
    }

    let Some(py) = projection_year.or_else(|| latest_year(all)) else {
        return rows;
    };
    if !years.contains(&py) {
        return rows;
    }
    let rs: Vec<&FleetRecord> = all.iter().filter(|r| r.year == py).collect();
    if rs.is_empty() {
        return rows;
    }
    let months = last_month_with_data(&rs) as f64;
    let scale = |v: f64| v / months * 12.0;
    let cost = scale(rs.iter().map(|r| r.fleet_total).sum());
    let km = scale(rs.iter().map(|r| r.total_km).sum());
    let working_days = scale(working_days_by_month(rs.iter().copied()).values().sum());
    let vehicles = distinct_plates(rs.iter().copied()) as f64;
    rows.push(AnnualSummaryRow {
        label: format!("{} (Proj.)", py),
        projected: true,
        total_cost: cost,
        total_km: km,
        avg_km_per_litre: adjusted_efficiency_mean(rs.iter().copied()),
        cost_per_km: safe_div(cost, km),
        km_per_vehicle: safe_div(km, vehicles),
        cost_per_working_day: safe_div(cost, working_days),
        cost_per_vehicle: safe_div(cost, vehicles),
    });
    rows
}

/// Latest month of the filtered table against the month before it, both
/// measured on the full table.
pub fn category_comparison(
    filtered: &[FleetRecord],
    all: &[FleetRecord],
) -> Vec<CategoryComparisonRow> {
    let Some(latest) = filtered.iter().map(|r| r.date).max() else {
        return Vec::new();
    };
    let current_key = month_key(latest);
    let previous_key = month_key(months_before(latest, 1));
    COST_CATEGORIES
        .iter()
        .map(|(name, cost)| {
            let sum_for = |key: &str| -> f64 {
                all.iter().filter(|r| r.month_key == key).map(cost).sum()
            };
            let current = sum_for(&current_key);
            let previous = sum_for(&previous_key);
            CategoryComparisonRow {
                category: name.to_string(),
                period: current_key.clone(),
                current,
                previous,
                delta_pct: percent_change(current, previous),
            }
        })
        .collect()
}

/// Category totals for the three latest years, the latest one projected to a
/// full year. Each row compares a year with the one listed before it.
pub fn annual_category_comparison(all: &[FleetRecord]) -> Vec<CategoryComparisonRow> {
    let years = years_to_show(all, &Selection::All);
    let Some(latest) = years.last().copied() else {
        return Vec::new();
    };
    let by_year: Vec<(i32, Vec<&FleetRecord>)> = years
        .iter()
        .map(|y| (*y, all.iter().filter(|r| r.year == *y).collect()))
        .collect();

    let mut rows = Vec::new();
    for (name, cost) in COST_CATEGORIES.iter() {
        let mut previous: Option<f64> = None;
        for (y, rs) in &by_year {
            let partial: f64 = rs.iter().copied().map(cost).sum();
            let (value, period) = if *y == latest {
                let months = last_month_with_data(rs) as f64;
                (partial / months * 12.0, format!("{} (Proj.)", y))
            } else {
                (partial, y.to_string())
            };
            let prev = previous.unwrap_or(0.0);
            let delta_pct = if previous.is_some() && prev > 0.0 {
                (value - prev) / prev * 100.0
            } else {
                0.0
            };
            rows.push(CategoryComparisonRow {
                category: name.to_string(),
                period,
                current: value,
                previous: prev,
                delta_pct,
            });
            previous = Some(value);
        }
    }
    rows
}

pub fn vehicle_group_costs(filtered: &[FleetRecord]) -> Vec<VehicleGroupRow> {
    #[derive(Default)]
    struct Acc<'a> {
        total_cost: f64,
        total_km: f64,
        plates: HashSet<&'a str>,
    }
    let mut map: BTreeMap<VehicleGroup, Acc> = BTreeMap::new();
    for r in filtered {
        let e = map.entry(r.vehicle_group).or_default();
        e.total_cost += r.fleet_total;
        e.total_km += r.total_km;
        e.plates.insert(r.plate.as_str());
    }
    // BTreeMap order is the enum order: Light, Medium, Heavy, Truck, Other.
    map.into_iter()
        .map(|(group, acc)| {
            let vehicles = acc.plates.len();
            VehicleGroupRow {
                group,
                vehicles,
                total_cost: acc.total_cost,
                avg_cost_per_vehicle: safe_div(acc.total_cost, vehicles as f64),
                total_km: acc.total_km,
                km_per_vehicle: safe_div(acc.total_km, vehicles as f64),
                cost_per_km: safe_div(acc.total_cost, acc.total_km),
            }
        })
        .collect()
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn rank_by<F>(rows: &[BranchPanoramaRow], f: F, descending: bool) -> Vec<usize>
where
    F: Fn(&BranchPanoramaRow) -> f64,
{
    let values: Vec<f64> = rows.iter().map(f).collect();
    min_rank(&values, descending)
}

pub fn branch_panorama(filtered: &[FleetRecord]) -> Vec<BranchPanoramaRow> {
    #[derive(Default)]
    struct Acc<'a> {
        total_cost: f64,
        general_maintenance: f64,
        fuel: f64,
        bodywork: f64,
        tires: f64,
        urea: f64,
        total_km: f64,
        working_days: f64,
        efficiency: Vec<f64>,
        plates: HashSet<&'a str>,
        groups: HashMap<VehicleGroup, usize>,
    }
    let mut map: HashMap<&str, Acc> = HashMap::new();
    for r in filtered {
        let e = map.entry(r.branch.as_str()).or_default();
        e.total_cost += r.fleet_total;
        e.general_maintenance += r.general_maintenance_cost;
        e.fuel += r.fuel_cost;
        e.bodywork += r.bodywork_cost;
        e.tires += r.tire_cost;
        e.urea += r.urea_cost;
        e.total_km += r.total_km;
        e.working_days += r.working_days.unwrap_or(0.0);
        if let Some(v) = r.km_per_litre_adjusted {
            e.efficiency.push(v);
        }
        e.plates.insert(r.plate.as_str());
        *e.groups.entry(r.vehicle_group).or_insert(0) += 1;
    }

    let mut rows: Vec<BranchPanoramaRow> = map
        .into_iter()
        .map(|(branch, acc)| {
            let vehicles = acc.plates.len();
            let main_group = acc
                .groups
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(g, _)| g.label().to_string())
                .unwrap_or_else(|| "N/A".to_string());
            BranchPanoramaRow {
                branch: branch.to_string(),
                total_cost: acc.total_cost,
                general_maintenance: acc.general_maintenance,
                fuel: acc.fuel,
                bodywork: acc.bodywork,
                tires: acc.tires,
                urea: acc.urea,
                vehicles,
                total_km: acc.total_km,
                working_days: acc.working_days,
                avg_km_per_litre: average(&acc.efficiency),
                cost_per_km: safe_div(acc.total_cost, acc.total_km),
                km_per_vehicle: safe_div(acc.total_km, vehicles as f64),
                cost_per_working_day: safe_div(acc.total_cost, acc.working_days),
                ticket_per_vehicle: safe_div(acc.total_cost, vehicles as f64),
                main_group,
                rank_total_cost: 0,
                rank_cost_per_km: 0,
                rank_efficiency: 0,
                rank_fleet: 0,
            }
        })
        .collect();

    let by_cost = rank_by(&rows, |r| r.total_cost, true);
    let by_cost_km = rank_by(&rows, |r| r.cost_per_km, false);
    let by_efficiency = rank_by(&rows, |r| r.avg_km_per_litre, true);
    let by_fleet = rank_by(&rows, |r| r.vehicles as f64, true);
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank_total_cost = by_cost[i];
        row.rank_cost_per_km = by_cost_km[i];
        row.rank_efficiency = by_efficiency[i];
        row.rank_fleet = by_fleet[i];
    }

    rows.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.branch.cmp(&b.branch))
    });
    rows
}

pub fn branch_insights(panorama: &[BranchPanoramaRow]) -> BranchInsights {
    if panorama.is_empty() {
        return BranchInsights::default();
    }
    let total_km: f64 = panorama.iter().map(|r| r.total_km).sum();
    let total_cost: f64 = panorama.iter().map(|r| r.total_cost).sum();
    let total_vehicles: usize = panorama.iter().map(|r| r.vehicles).sum();
    let worst_cost_km = panorama
        .iter()
        .map(|r| r.cost_per_km)
        .fold(f64::MIN, f64::max);
    let lowest_efficiency = panorama
        .iter()
        .map(|r| r.avg_km_per_litre)
        .fold(f64::MAX, f64::min);

    let most_efficient = panorama
        .iter()
        .min_by(|a, b| cmp_f64(a.cost_per_km, b.cost_per_km))
        .map(|r| BranchHighlight {
            branch: r.branch.clone(),
            value: r.cost_per_km,
            detail: (worst_cost_km - r.cost_per_km) * total_km,
        });
    let best_fuel_efficiency = panorama
        .iter()
        .max_by(|a, b| cmp_f64(a.avg_km_per_litre, b.avg_km_per_litre))
        .map(|r| BranchHighlight {
            branch: r.branch.clone(),
            value: r.avg_km_per_litre,
            detail: r.avg_km_per_litre - lowest_efficiency,
        });
    let largest_fleet = panorama
        .iter()
        .max_by(|a, b| a.vehicles.cmp(&b.vehicles).then_with(|| b.branch.cmp(&a.branch)))
        .map(|r| BranchHighlight {
            branch: r.branch.clone(),
            value: r.vehicles as f64,
            detail: safe_div(r.vehicles as f64, total_vehicles as f64) * 100.0,
        });
    // Panorama is already sorted by total cost.
    let largest_operation = panorama.first().map(|r| BranchHighlight {
        branch: r.branch.clone(),
        value: r.total_cost,
        detail: safe_div(r.total_cost, total_cost) * 100.0,
    });

    BranchInsights {
        most_efficient,
        best_fuel_efficiency,
        largest_fleet,
        largest_operation,
    }
}

pub fn monthly_trends(filtered: &[FleetRecord]) -> Vec<MonthlyTrendRow> {
    #[derive(Default)]
    struct Acc<'a> {
        total_cost: f64,
        maintenance: f64,
        fuel: f64,
        total_km: f64,
        plates: HashSet<&'a str>,
    }
    let mut map: BTreeMap<&str, Acc> = BTreeMap::new();
    for r in filtered {
        let e = map.entry(r.month_key.as_str()).or_default();
        e.total_cost += r.fleet_total;
        e.maintenance += r.maintenance_total;
        e.fuel += r.fuel_total;
        e.total_km += r.total_km;
        e.plates.insert(r.plate.as_str());
    }
    if map.len() < 2 {
        return Vec::new();
    }
    let mut rows: Vec<MonthlyTrendRow> = map
        .into_iter()
        .map(|(month, acc)| MonthlyTrendRow {
            month: month.to_string(),
            total_cost: acc.total_cost,
            maintenance: acc.maintenance,
            fuel: acc.fuel,
            total_km: acc.total_km,
            vehicles: acc.plates.len(),
            cost_per_km: safe_div(acc.total_cost, acc.total_km),
            cost_per_km_ma3: None,
        })
        .collect();
    let cost_per_km: Vec<f64> = rows.iter().map(|r| r.cost_per_km).collect();
    for (row, ma) in rows.iter_mut().zip(moving_average(&cost_per_km, 3, 3)) {
        row.cost_per_km_ma3 = ma;
    }
    rows
}

pub fn vehicle_detail(filtered: &[FleetRecord]) -> Vec<VehicleDetailRow> {
    let mut map: HashMap<&str, VehicleDetailRow> = HashMap::new();
    for r in filtered {
        let e = map.entry(r.plate.as_str()).or_insert_with(|| VehicleDetailRow {
            rank: 0,
            plate: r.plate.clone(),
            model: r.model.clone(),
            group: r.vehicle_group,
            brand: r.brand.clone(),
            fuel_type: r.fuel_type.clone(),
            route_type: r.route_type.clone(),
            contract: r.contract.clone(),
            main_route: r.main_route.clone(),
            main_driver: r.main_driver.clone(),
            region: r.region.clone(),
            branch: r.branch.clone(),
            fuel: 0.0,
            urea: 0.0,
            general_maintenance: 0.0,
            tires: 0.0,
            bodywork: 0.0,
            total_cost: 0.0,
        });
        e.fuel += r.fuel_cost;
        e.urea += r.urea_cost;
        e.general_maintenance += r.general_maintenance_cost;
        e.tires += r.tire_cost;
        e.bodywork += r.bodywork_cost;
    }
    let mut rows: Vec<VehicleDetailRow> = map
        .into_values()
        .map(|mut row| {
            row.total_cost = row.fuel + row.urea + row.general_maintenance + row.tires + row.bodywork;
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.plate.cmp(&b.plate))
    });
    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx + 1;
    }
    rows
}

pub fn operational_kpis(filtered: &[FleetRecord]) -> OperationalKpis {
    let mut kpis = OperationalKpis::default();
    if filtered.is_empty() {
        return kpis;
    }

    let readings: Vec<(&str, f64)> = filtered
        .iter()
        .filter_map(|r| r.km_per_litre_adjusted.map(|v| (r.plate.as_str(), v)))
        .collect();
    if !readings.is_empty() {
        let values: Vec<f64> = readings.iter().map(|(_, v)| *v).collect();
        kpis.avg_km_per_litre = Some(average(&values));
        let cmp = |a: &&(&str, f64), b: &&(&str, f64)| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        if let Some((plate, v)) = readings.iter().max_by(cmp) {
            kpis.best_efficiency_vehicle = Some(plate.to_string());
            kpis.best_efficiency_value = Some(*v);
        }
        if let Some((plate, v)) = readings.iter().min_by(cmp) {
            kpis.worst_efficiency_vehicle = Some(plate.to_string());
            kpis.worst_efficiency_value = Some(*v);
        }
    }

    let total_cost: f64 = filtered.iter().map(|r| r.fleet_total).sum();
    let total_km: f64 = filtered.iter().map(|r| r.total_km).sum();
    kpis.cost_per_km = safe_div(total_cost, total_km);

    let mut km_by_plate: BTreeMap<&str, f64> = BTreeMap::new();
    for r in filtered {
        *km_by_plate.entry(r.plate.as_str()).or_insert(0.0) += r.total_km;
    }
    let per_vehicle: Vec<f64> = km_by_plate.values().copied().collect();
    kpis.avg_km_per_vehicle = mean_opt(&per_vehicle);
    kpis.fleet_total_km = per_vehicle.iter().sum();
    if let Some((plate, km)) = km_by_plate
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
    {
        if *km > 0.0 {
            kpis.top_distance_vehicle = Some(plate.to_string());
            kpis.top_distance_km = Some(*km);
        }
    }

    let days: Vec<f64> = working_days_by_month(filtered).into_values().collect();
    kpis.avg_working_days = average(&days);
    kpis.total_working_days = days.iter().sum();
    kpis.cost_per_working_day = safe_div(total_cost, kpis.total_working_days);

    #[derive(Default)]
    struct ContractAcc<'a> {
        cost: f64,
        plates: HashSet<&'a str>,
    }
    let mut contracts: BTreeMap<&str, ContractAcc> = BTreeMap::new();
    for r in filtered {
        let Some(group) = r.contract_group.as_deref() else {
            continue;
        };
        let e = contracts.entry(group).or_default();
        e.cost += r.fleet_total;
        e.plates.insert(r.plate.as_str());
    }
    kpis.contract_diversity = contracts.len();
    if let Some((name, acc)) = contracts
        .iter()
        .max_by(|a, b| a.1.cost.partial_cmp(&b.1.cost).unwrap_or(Ordering::Equal))
    {
        if acc.cost > 0.0 {
            kpis.costliest_contract = Some(name.to_string());
            kpis.costliest_contract_cost = Some(acc.cost);
            kpis.costliest_contract_share_pct = Some(safe_div(acc.cost, total_cost) * 100.0);
        }
    }
    let fleet_size = distinct_plates(filtered) as f64;
    if let Some((name, acc)) = contracts
        .iter()
        .max_by(|a, b| a.1.plates.len().cmp(&b.1.plates.len()).then_with(|| b.0.cmp(a.0)))
    {
        kpis.most_active_contract = Some(name.to_string());
        kpis.most_active_contract_vehicles = Some(acc.plates.len());
        kpis.most_active_contract_fleet_pct =
            Some(safe_div(acc.plates.len() as f64, fleet_size) * 100.0);
    }

    let per_km: Vec<f64> = filtered.iter().filter_map(|r| r.maintenance_per_km).collect();
    kpis.avg_maintenance_per_km = match mean_opt(&per_km) {
        Some(v) => v,
        None => safe_div(filtered.iter().map(|r| r.maintenance_total).sum(), total_km),
    };

    let mut regions: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for r in filtered {
        let e = regions.entry(r.region.as_str()).or_insert((0.0, 0.0));
        e.0 += r.fleet_total;
        e.1 += r.total_km;
    }
    if let Some((region, cost_km)) = regions
        .into_iter()
        .filter(|(_, (_, km))| *km > 0.0)
        .map(|(region, (cost, km))| (region, cost / km))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    {
        kpis.most_efficient_region = Some(region.to_string());
        kpis.most_efficient_region_cost_per_km = Some(cost_km);
    }

    kpis
}

pub fn macro_split(filtered: &[FleetRecord]) -> MacroSplit {
    let maintenance: f64 = filtered.iter().map(|r| r.maintenance_total).sum();
    let fuel_and_urea: f64 = filtered.iter().map(|r| r.fuel_total).sum();
    let total = maintenance + fuel_and_urea;
    MacroSplit {
        maintenance,
        fuel_and_urea,
        total,
        maintenance_pct: safe_div(maintenance, total) * 100.0,
        fuel_and_urea_pct: safe_div(fuel_and_urea, total) * 100.0,
    }
}

pub fn generate_summary(filtered: &[FleetRecord]) -> SummaryStats {
    let branches: HashSet<&str> = filtered.iter().map(|r| r.branch.as_str()).collect();
    let regions: HashSet<&str> = filtered.iter().map(|r| r.region.as_str()).collect();
    let months: HashSet<&str> = filtered.iter().map(|r| r.month_key.as_str()).collect();
    SummaryStats {
        total_records: filtered.len(),
        total_vehicles: distinct_plates(filtered),
        total_branches: branches.len(),
        total_regions: regions.len(),
        total_months: months.len(),
        total_cost: filtered.iter().map(|r| r.fleet_total).sum(),
        total_km: filtered.iter().map(|r| r.total_km).sum(),
        split: macro_split(filtered),
    }
}
