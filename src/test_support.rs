//! Builders shared by unit tests.
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::types::{FleetRecord, VehicleGroup};
use crate::util::month_key;

/// A record whose whole cost sits in general maintenance.
pub fn record(date: &str, plate: &str, cost: f64) -> FleetRecord {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("test date");
    FleetRecord {
        date,
        year: date.year(),
        month_key: month_key(date),
        plate: plate.to_string(),
        model: "STRADA".to_string(),
        brand: "FIAT".to_string(),
        vehicle_group: VehicleGroup::Light,
        motorcycle: false,
        region: "SUL".to_string(),
        branch: "CURITIBA".to_string(),
        contract: "DHL".to_string(),
        contract_group: Some("Dhl - Curitiba".to_string()),
        fuel_type: "Diesel".to_string(),
        route_type: "Urban".to_string(),
        main_route: String::new(),
        main_driver: String::new(),
        model_year: Some(2020),
        age: Some(5),
        bodywork_cost: 0.0,
        general_maintenance_cost: cost,
        tire_cost: 0.0,
        fuel_cost: 0.0,
        urea_cost: 0.0,
        maintenance_total: cost,
        fuel_total: 0.0,
        fleet_total: cost,
        km_start: 0.0,
        km_end: 0.0,
        km_driven: 0.0,
        total_km: 0.0,
        litres: 0.0,
        fuel_cost_per_km: 0.0,
        maintenance_per_km: None,
        km_per_litre: None,
        km_per_litre_adjusted: None,
        working_days: None,
        duc: 0.0,
        duk: 0.0,
        dul: 0.0,
    }
}

/// Split `fuel` out of the fleet total, keeping totals consistent.
pub fn with_fuel(mut r: FleetRecord, fuel: f64, urea: f64) -> FleetRecord {
    r.fuel_cost = fuel;
    r.urea_cost = urea;
    r.fuel_total = fuel + urea;
    r.fleet_total = r.maintenance_total + r.fuel_total;
    r
}

pub fn create_fleet_db(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("open test db");
    conn.execute_batch(
        "CREATE TABLE filiais (id_filial INTEGER, filial TEXT, regiao TEXT);
         CREATE TABLE frota (placa TEXT, ano INTEGER);
         CREATE TABLE transacoes (
             placa TEXT, modelo TEXT, marca TEXT, grupo_veiculo TEXT, id_filial INTEGER,
             contrato TEXT, tipo_combustivel TEXT, tipo_rota TEXT, mes TEXT,
             lataria_pintura REAL, manutencao REAL, rodas_pneus REAL,
             valor_combustivel REAL, arla REAL, km_inicial REAL, km_final REAL,
             total_km REAL, media_km_litro REAL, litros_combustivel REAL,
             dias_uteis REAL, roteiro_principal TEXT, motorista_principal TEXT
         );
         INSERT INTO filiais VALUES (1, 'Curitiba', 'Sul');
         INSERT INTO frota VALUES ('ABC1234', 2020);",
    )
    .expect("create test schema");
    conn
}

pub fn insert_transaction(conn: &Connection, plate: &str, month: &str, maintenance: f64) {
    conn.execute(
        "INSERT INTO transacoes (placa, modelo, grupo_veiculo, id_filial, contrato,
             tipo_combustivel, tipo_rota, mes, manutencao, valor_combustivel, arla,
             total_km, media_km_litro, dias_uteis)
         VALUES (?1, 'STRADA', 'Leve', 1, 'DHL', 'DIESEL S10', 'urbano', ?2, ?3, 10.0, 1.0,
             100.0, 9.0, 21)",
        params![plate, month, maintenance],
    )
    .expect("insert test transaction");
}
