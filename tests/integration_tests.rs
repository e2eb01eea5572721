use fleet_report::filters::{FilterParams, Selection};
use fleet_report::kpi::{cost_variability, performance_kpis, CostMetric, Trend};
use fleet_report::loader::SheetNames;
use fleet_report::pipeline::PipelineOptions;
use fleet_report::provider::{DataProvider, DataSource, DEFAULT_TTL};
use fleet_report::reports;
use fleet_report::types::VehicleGroup;
use rusqlite::Connection;
use rust_xlsxwriter::Workbook;
use std::path::Path;
use tempfile::tempdir;

const TX_HEADERS: [&str; 15] = [
    "Placa",
    "Modelo",
    "Marca",
    "GrupoCorreto",
    "ID Filial",
    "Contrato",
    "TP.Comb",
    "TP.Rota",
    "Mês",
    "Manutenção",
    // Double space as it appears in the source workbook.
    "Valor  Comb.",
    "Arla",
    "Total de Km",
    "Média Km/l",
    "Dias Úteis",
];

enum V {
    S(&'static str),
    N(f64),
}

fn tx_rows() -> Vec<Vec<V>> {
    use V::{N, S};
    vec![
        vec![
            S("ABC1234"), S("STRADA"), S("FIAT"), S("Leve"), N(1.0), S("DHL EXPRESS"),
            S("DIESEL S10"), S("urbano"), S("2025-01-01"), N(100.0), N(50.0), N(5.0),
            N(500.0), N(10.0), N(21.0),
        ],
        vec![
            S("ABC1234"), S("STRADA"), S("FIAT"), S("Leve"), N(1.0), S("DHL EXPRESS"),
            S("DIESEL S10"), S("urbano"), S("2025-02-01"), N(200.0), N(60.0), N(0.0),
            N(600.0), N(50.0), N(20.0),
        ],
        vec![
            S("DEF5678"), S("ACCELO"), S("MERCEDES"), S("Pesado"), N(2.0), S("ECT"),
            S("GASOLINA"), S("rodoviário"), S("2025-02-01"), N(300.0), N(100.0), N(-20.0),
            N(400.0), S("n/a"), N(20.0),
        ],
        vec![
            S("ABC1234"), S("STRADA"), S("FIAT"), S("Leve"), N(1.0), S("DHL EXPRESS"),
            S("DIESEL S10"), S("urbano"), S("2025-03-01"), N(400.0), N(70.0), N(0.0),
            N(700.0), N(9.0), N(22.0),
        ],
        // No month: dropped.
        vec![
            S("GHI9012"), S("STRADA"), S("FIAT"), S("Leve"), N(1.0), S("DHL"),
            S("DIESEL"), S("urbano"), S(""), N(999.0), N(0.0), N(0.0),
            N(0.0), N(0.0), N(0.0),
        ],
    ]
}

fn write_workbook(path: &Path) {
    let mut wb = Workbook::new();

    let ws = wb.add_worksheet();
    ws.set_name("BD 2023").unwrap();
    for (c, h) in TX_HEADERS.iter().enumerate() {
        ws.write_string(0, c as u16, *h).unwrap();
    }
    for (r, row) in tx_rows().iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            let (r, c) = (r as u32 + 1, c as u16);
            match v {
                V::S("") => {}
                V::S(s) => {
                    ws.write_string(r, c, *s).unwrap();
                }
                V::N(n) => {
                    ws.write_number(r, c, *n).unwrap();
                }
            }
        }
    }

    let ws = wb.add_worksheet();
    ws.set_name("FROTA").unwrap();
    ws.write_string(0, 0, "Placa").unwrap();
    ws.write_string(0, 1, "Ano").unwrap();
    ws.write_string(1, 0, "ABC1234").unwrap();
    ws.write_number(1, 1, 2020.0).unwrap();
    ws.write_string(2, 0, "DEF5678").unwrap();
    ws.write_number(2, 1, 2018.0).unwrap();

    let ws = wb.add_worksheet();
    ws.set_name("Filiais").unwrap();
    for (c, h) in ["ID Filial", "Filial", "Regiao"].iter().enumerate() {
        ws.write_string(0, c as u16, *h).unwrap();
    }
    ws.write_number(1, 0, 1.0).unwrap();
    ws.write_string(1, 1, "Curitiba").unwrap();
    ws.write_string(1, 2, "Sul").unwrap();
    ws.write_number(2, 0, 2.0).unwrap();
    ws.write_string(2, 1, "Belém").unwrap();
    ws.write_string(2, 2, "Norte").unwrap();

    wb.save(path).unwrap();
}

fn options() -> PipelineOptions {
    PipelineOptions {
        restrict_year: None,
        reference_year: 2025,
    }
}

#[test]
fn workbook_to_reports() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.xlsx");
    write_workbook(&path);

    let provider = DataProvider::new(
        DataSource::Workbook {
            path,
            sheets: SheetNames::default(),
        },
        options(),
        DEFAULT_TTL,
    );
    let all = provider.try_get_data().unwrap();
    assert_eq!(all.len(), 4);

    let report = provider.last_report().unwrap();
    assert_eq!(report.total_rows, 5);
    assert_eq!(report.missing_dates, 1);
    assert_eq!(report.adjusted_efficiency, 1);

    let first = &all[0];
    assert_eq!(first.branch, "CURITIBA");
    assert_eq!(first.region, "SUL");
    assert_eq!(first.fuel_type, "Diesel");
    assert_eq!(first.route_type, "Urban");
    assert_eq!(first.vehicle_group, VehicleGroup::Light);
    assert_eq!(first.contract_group.as_deref(), Some("Dhl - Curitiba"));
    assert_eq!(first.age, Some(5));
    assert_eq!(first.fuel_cost, 50.0);
    assert_eq!(first.fleet_total, 155.0);

    // Out-of-band reading replaced by the model mean.
    assert_eq!(all[1].km_per_litre, Some(50.0));
    assert_eq!(all[1].km_per_litre_adjusted, Some(9.5));

    let heavy = &all[2];
    assert_eq!(heavy.vehicle_group, VehicleGroup::Heavy);
    assert_eq!(heavy.fuel_type, "Gasoline");
    assert_eq!(heavy.route_type, "Highway");
    assert_eq!(heavy.urea_cost, 0.0);
    assert_eq!(heavy.km_per_litre, None);

    let filters = FilterParams {
        year: Selection::Only(2025),
        month: Selection::Only("2025-03".to_string()),
        ..FilterParams::default()
    };
    let k = performance_kpis(&all, &filters.year, &filters.month, CostMetric::FleetTotal).unwrap();
    assert_eq!(k.current, 470.0);
    assert_eq!(k.previous, 660.0);
    assert_eq!(k.total_3m, 815.0);
    assert_eq!(k.working_days_current, 22.0);
    assert_eq!(k.working_days_3m, 41.0);
    assert_eq!(k.trend, Trend::Increasing);

    let v = cost_variability(&all, &filters.month, CostMetric::FleetTotal).unwrap();
    assert_eq!(v.series.len(), 3);
    assert_eq!(v.amplitude, 505.0);

    let filtered = filters.apply(&all);
    assert_eq!(filtered.len(), 1);
    let comparison = reports::category_comparison(&filtered, &all);
    let fuel = comparison.iter().find(|r| r.category == "Fuel").unwrap();
    assert_eq!(fuel.current, 70.0);
    assert_eq!(fuel.previous, 160.0);

    let panorama = reports::branch_panorama(&all);
    assert_eq!(panorama.len(), 2);
    assert_eq!(panorama[0].branch, "CURITIBA");
    assert_eq!(panorama[0].total_cost, 885.0);

    let annual = reports::annual_summary(&all, &Selection::All, None);
    assert_eq!(annual.len(), 2);
    assert_eq!(annual[1].total_cost, 1285.0 / 3.0 * 12.0);

    let groups = reports::vehicle_group_costs(&all);
    assert_eq!(groups[0].group, VehicleGroup::Light);
    assert_eq!(groups[1].group, VehicleGroup::Heavy);
}

#[test]
fn restricted_year_drops_other_years() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.xlsx");
    write_workbook(&path);
    let provider = DataProvider::new(
        DataSource::Workbook {
            path,
            sheets: SheetNames::default(),
        },
        PipelineOptions {
            restrict_year: Some(2024),
            reference_year: 2025,
        },
        DEFAULT_TTL,
    );
    assert!(provider.get_data().is_empty());
    assert_eq!(provider.last_report().map(|r| r.outside_restricted_year), Some(4));
}

#[test]
fn missing_sheet_yields_empty_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.xlsx");
    write_workbook(&path);
    let provider = DataProvider::new(
        DataSource::Workbook {
            path,
            sheets: SheetNames {
                fleet: "Veiculos".to_string(),
                ..SheetNames::default()
            },
        },
        options(),
        DEFAULT_TTL,
    );
    assert!(provider.get_data().is_empty());
    assert!(provider.try_get_data().is_err());
}

#[test]
fn database_source_matches_workbook_rules() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let conn = Connection::open(&path).unwrap();
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
         INSERT INTO frota VALUES ('ABC1234', 2020);
         INSERT INTO transacoes (placa, modelo, grupo_veiculo, id_filial, contrato,
             tipo_combustivel, tipo_rota, mes, manutencao, valor_combustivel, arla,
             km_inicial, km_final, media_km_litro, dias_uteis)
         VALUES
             ('ABC1234', 'STRADA', 'Caminhão 3/4', 1, 'LEROY MERLIN', 'Diesel S500',
              'Urbano e Rodoviário', '2025-01-01 00:00:00', 100.0, 20.0, 2.0,
              1000.0, 1400.0, 8.0, 21),
             ('XYZ9876', 'BIZ', 'MOTO', 9, NULL, 'GASOLINA', 'urbano', '2025-01-01',
              10.0, 5.0, 0.0, 0.0, 0.0, 40.0, NULL);",
    )
    .unwrap();
    drop(conn);

    let provider = DataProvider::new(
        DataSource::Database { path, query: None },
        options(),
        DEFAULT_TTL,
    );
    let all = provider.try_get_data().unwrap();
    assert_eq!(all.len(), 2);

    let truck = &all[0];
    assert_eq!(truck.vehicle_group, VehicleGroup::Truck);
    assert_eq!(truck.fuel_type, "Diesel");
    assert_eq!(truck.route_type, "Urban and Highway");
    assert_eq!(truck.contract_group.as_deref(), Some("Leroy Merlin - Curitiba"));
    // No total-km column value: falls back to the odometer difference.
    assert_eq!(truck.total_km, 400.0);
    assert_eq!(truck.model_year, Some(2020));

    let moto = &all[1];
    assert!(moto.motorcycle);
    assert_eq!(moto.vehicle_group, VehicleGroup::Light);
    assert_eq!(moto.km_per_litre_adjusted, Some(40.0));
    assert_eq!(moto.branch, "NOT INFORMED");
    assert_eq!(moto.contract, "NOT INFORMED");
    assert_eq!(
        moto.contract_group.as_deref(),
        Some("Contract Not Informed - Branch Not Informed")
    );
    assert_eq!(moto.working_days, None);

    let k = reports::operational_kpis(&all);
    assert_eq!(k.contract_diversity, 2);
}

#[test]
fn empty_source_produces_empty_reports() {
    let dir = tempdir().unwrap();
    let provider = DataProvider::new(
        DataSource::Database {
            path: dir.path().join("missing.db"),
            query: None,
        },
        options(),
        DEFAULT_TTL,
    );
    let all = provider.get_data();
    assert!(all.is_empty());
    assert!(reports::annual_summary(&all, &Selection::All, None).is_empty());
    assert!(reports::branch_panorama(&all).is_empty());
    assert!(reports::monthly_trends(&all).is_empty());
    let k = performance_kpis(
        &all,
        &Selection::Only(2025),
        &Selection::Only("2025-03".to_string()),
        CostMetric::FleetTotal,
    )
    .unwrap();
    assert_eq!(k.current, 0.0);
    assert_eq!(k.working_days_3m, 66.0);
}
