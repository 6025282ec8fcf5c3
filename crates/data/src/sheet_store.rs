//! Per-sheet columnar storage (C9).
//!
//! Each sheet of an ingested [`reportdeck_domain::model::Dataset`] is
//! persisted as its own SQLite file holding one table, `t` — the same
//! single-table-per-file shape the NL→SQL pipeline (C10) expects to query
//! without a separate registration step. SQLite stands in for the
//! original's DuckDB-over-Parquet combination (see DESIGN.md): both give
//! a typed, queryable, single-writer-discipline columnar store, but
//! `rusqlite` is already the pack's SQL engine of choice, so there is no
//! reason to carry a second one for storage alone.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;

use reportdeck_domain::model::ColumnInfo;
use reportdeck_domain::Error;

/// One decoded cell, typed loosely enough to cover CSV/XLSX ingestion.
#[derive(Debug, Clone)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

fn sqlite_type_for(dtype: &str) -> &'static str {
    match dtype {
        "integer" => "INTEGER",
        "double" => "REAL",
        _ => "TEXT",
    }
}

/// Write one sheet's columns+rows to a fresh SQLite file at `path`,
/// replacing any existing file (sheets are written once and never
/// mutated, §3, so this is only ever called during ingest).
pub fn write_sheet(path: &Path, columns: &[ColumnInfo], rows: &[Vec<CellValue>]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut conn = Connection::open(path).map_err(to_permanent)?;

    let cols_ddl = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, sqlite_type_for(&c.dtype)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!("CREATE TABLE t ({cols_ddl});"))
        .map_err(to_permanent)?;

    let placeholders = columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let insert_sql = format!("INSERT INTO t VALUES ({placeholders})");

    let tx = conn.transaction().map_err(to_permanent)?;
    {
        let mut stmt = tx.prepare(&insert_sql).map_err(to_permanent)?;
        for row in rows {
            let params: Vec<Box<dyn rusqlite::ToSql>> = row
                .iter()
                .map(|v| -> Box<dyn rusqlite::ToSql> {
                    match v {
                        CellValue::Null => Box::new(rusqlite::types::Null),
                        CellValue::Int(i) => Box::new(*i),
                        CellValue::Float(f) => Box::new(*f),
                        CellValue::Text(s) => Box::new(s.clone()),
                    }
                })
                .collect();
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
            stmt.execute(refs.as_slice()).map_err(to_permanent)?;
        }
    }
    tx.commit().map_err(to_permanent)?;
    Ok(())
}

pub fn load_schema(path: &Path) -> Result<Vec<ColumnInfo>, Error> {
    let conn = Connection::open(path).map_err(to_permanent)?;
    let mut stmt = conn.prepare("PRAGMA table_info(t)").map_err(to_permanent)?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let decl_type: String = row.get(2)?;
            Ok(ColumnInfo {
                name,
                dtype: match decl_type.as_str() {
                    "INTEGER" => "integer".to_string(),
                    "REAL" => "double".to_string(),
                    _ => "text".to_string(),
                },
            })
        })
        .map_err(to_permanent)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_permanent)?;
    Ok(columns)
}

/// Validate `sql` against `path`'s schema by preparing it (§4.10 step 5's
/// "execute EXPLAIN to validate"; `prepare` alone resolves column/table
/// references against the schema, which is the failure mode that matters
/// here).
pub fn validate(path: &Path, sql: &str) -> Result<(), Error> {
    let conn = Connection::open(path).map_err(to_permanent)?;
    conn.prepare(&format!("EXPLAIN {sql}")).map_err(to_permanent)?;
    Ok(())
}

/// Execute `sql` and return `(column_names, rows)`, rows capped at
/// `limit_rows` (§4.10 step 6).
pub fn execute(path: &Path, sql: &str, limit_rows: u64) -> Result<(Vec<String>, Vec<Vec<Value>>), Error> {
    let conn = Connection::open(path).map_err(to_permanent)?;
    let mut stmt = conn.prepare(sql).map_err(to_permanent)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let ncols = column_names.len();

    let mut rows_iter = stmt.query([]).map_err(to_permanent)?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next().map_err(to_permanent)? {
        if rows.len() as u64 >= limit_rows {
            break;
        }
        let mut out_row = Vec::with_capacity(ncols);
        for i in 0..ncols {
            let value_ref = row.get_ref(i).map_err(to_permanent)?;
            out_row.push(value_ref_to_json(value_ref));
        }
        rows.push(out_row);
    }
    Ok((column_names, rows))
}

fn value_ref_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

fn to_permanent(e: rusqlite::Error) -> Error {
    Error::backend_permanent(format!("sqlite: {e}"))
}

pub fn dataset_dir(out_dir: &Path, dataset_id: &str) -> PathBuf {
    out_dir.join("data").join(dataset_id)
}
