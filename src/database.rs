//! Relational source.
//!
//! The registries are joined in SQL, but categorical values come back raw:
//! fuel, route, group and contract rules live only in `normalize`.
use rusqlite::{types::Value, Connection, OpenFlags};
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{Cell, RawTable, SourceTables};
use crate::util::collapse_whitespace;

/// Default flat transaction query. Column aliases match the workbook headers
/// so both sources share one pipeline.
pub const TRANSACTIONS_QUERY: &str = r#"
SELECT
    t.placa               AS "Placa",
    t.modelo              AS "Modelo",
    t.marca               AS "Marca",
    t.grupo_veiculo       AS "GrupoCorreto",
    t.id_filial           AS "ID Filial",
    f.filial              AS "Filial",
    f.regiao              AS "Regiao",
    v.ano                 AS "Ano",
    t.contrato            AS "Contrato",
    t.tipo_combustivel    AS "TP.Comb",
    t.tipo_rota           AS "TP.Rota",
    t.mes                 AS "Mês",
    t.lataria_pintura     AS "Lataria e Pintura",
    t.manutencao          AS "Manutenção",
    t.rodas_pneus         AS "Rodas / Pneus",
    t.valor_combustivel   AS "Valor Comb.",
    t.arla                AS "Arla",
    t.km_inicial          AS "Km Inicial",
    t.km_final            AS "Km Final",
    t.total_km            AS "Total de Km",
    t.media_km_litro      AS "Média Km/l",
    t.litros_combustivel  AS "Litros Comb.",
    t.dias_uteis          AS "Dias Úteis",
    t.roteiro_principal   AS "Roteiro Principal",
    t.motorista_principal AS "Motorista Principal"
FROM transacoes t
LEFT JOIN filiais f ON f.id_filial = t.id_filial
LEFT JOIN frota v ON v.placa = t.placa
"#;

fn to_cell(value: Value) -> Cell {
    match value {
        Value::Null | Value::Blob(_) => Cell::Empty,
        Value::Integer(i) => Cell::Number(i as f64),
        Value::Real(f) => Cell::Number(f),
        Value::Text(s) => Cell::Text(s),
    }
}

pub fn query_table(conn: &Connection, name: &str, sql: &str) -> Result<RawTable> {
    let mut stmt = conn.prepare(sql)?;
    let headers: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|c| collapse_whitespace(c))
        .collect();
    let width = headers.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i).map(to_cell))
                .collect::<rusqlite::Result<Vec<Cell>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(RawTable::new(name, headers, rows))
}

/// Run the transaction query against a SQLite database opened read-only.
pub fn read_database(path: &Path, query: Option<&str>) -> Result<SourceTables> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "database not found: {}",
            path.display()
        )));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let transactions = query_table(&conn, "transacoes", query.unwrap_or(TRANSACTIONS_QUERY))?;
    info!(path = %path.display(), rows = transactions.rows.len(), "Database loaded");
    Ok(SourceTables {
        transactions,
        fleet: None,
        branches: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_sqlite_values() {
        assert_eq!(to_cell(Value::Null), Cell::Empty);
        assert_eq!(to_cell(Value::Integer(3)), Cell::Number(3.0));
        assert_eq!(to_cell(Value::Text("SUL".into())), Cell::Text("SUL".into()));
    }

    #[test]
    fn query_table_keeps_aliases_as_headers() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (placa TEXT, valor REAL);
             INSERT INTO t VALUES ('ABC1234', 10.5), (NULL, NULL);",
        )
        .unwrap();
        let table = query_table(
            &conn,
            "t",
            r#"SELECT placa AS "Placa", valor AS "Valor  Comb." FROM t"#,
        )
        .unwrap();
        assert_eq!(table.headers, vec!["Placa", "Valor Comb."]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], Cell::Number(10.5));
        assert_eq!(table.rows[1][0], Cell::Empty);
    }

    #[test]
    fn missing_database_is_reported() {
        let err = read_database(Path::new("/nonexistent/fleet.db"), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
