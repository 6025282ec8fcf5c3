//! Source-file sheet detection (part of C9).
//!
//! CSV files become a single sheet; spreadsheet workbooks (`.xlsx`/`.xls`/
//! `.xlsm`) are read with `calamine` and yield one sheet per worksheet.
//! Column dtype is inferred per column: `integer` if every non-empty cell
//! parses as an integer, `double` if every one parses as a float, else
//! `text` — the same three-way split `reportdeck-data::sheet_store`
//! stores as SQLite column types.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, DataType, Reader};

use reportdeck_domain::model::ColumnInfo;
use reportdeck_domain::Error;

use crate::sheet_store::CellValue;

pub struct SheetData {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Detect and decode all sheets in `source_bytes`, named `filename` (the
/// extension decides CSV vs. workbook parsing).
pub fn detect_sheets(source_bytes: &[u8], filename: &str) -> Result<Vec<SheetData>, Error> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if ext == "csv" {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sheet1");
        return Ok(vec![parse_csv(stem, source_bytes)?]);
    }

    parse_workbook(source_bytes)
}

fn parse_csv(sheet_name: &str, bytes: &[u8]) -> Result<SheetData, Error> {
    let mut reader = csv::ReaderBuilder::new().from_reader(Cursor::new(bytes));
    let headers = reader
        .headers()
        .map_err(|e| Error::bad_request(format!("malformed CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::bad_request(format!("malformed CSV row: {e}")))?;
        raw_rows.push(record.iter().map(str::to_string).collect());
    }

    let columns = infer_text_columns(&headers, &raw_rows);
    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(columns.iter())
                .map(|(cell, col)| coerce_text_cell(&cell, &col.dtype))
                .collect()
        })
        .collect();

    Ok(SheetData {
        name: sheet_name.to_string(),
        columns,
        rows,
    })
}

fn infer_text_columns(headers: &[String], rows: &[Vec<String>]) -> Vec<ColumnInfo> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let dtype = infer_dtype(rows.iter().filter_map(|r| r.get(i)).map(String::as_str));
            ColumnInfo {
                name: name.clone(),
                dtype,
            }
        })
        .collect()
}

fn infer_dtype<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut saw_any = false;
    let mut all_int = true;
    let mut all_float = true;
    for v in values {
        if v.trim().is_empty() {
            continue;
        }
        saw_any = true;
        if v.parse::<i64>().is_err() {
            all_int = false;
        }
        if v.parse::<f64>().is_err() {
            all_float = false;
        }
    }
    if !saw_any {
        "text".to_string()
    } else if all_int {
        "integer".to_string()
    } else if all_float {
        "double".to_string()
    } else {
        "text".to_string()
    }
}

fn coerce_text_cell(cell: &str, dtype: &str) -> CellValue {
    if cell.trim().is_empty() {
        return CellValue::Null;
    }
    match dtype {
        "integer" => cell.parse::<i64>().map(CellValue::Int).unwrap_or(CellValue::Null),
        "double" => cell.parse::<f64>().map(CellValue::Float).unwrap_or(CellValue::Null),
        _ => CellValue::Text(cell.to_string()),
    }
}

fn parse_workbook(bytes: &[u8]) -> Result<Vec<SheetData>, Error> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| Error::bad_request(format!("unrecognized spreadsheet format: {e}")))?;

    let mut sheets = Vec::new();
    for sheet_name in workbook.sheet_names().to_owned() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .ok_or_else(|| Error::bad_request(format!("missing worksheet: {sheet_name}")))?
            .map_err(|e| Error::bad_request(format!("reading worksheet {sheet_name}: {e}")))?;

        let mut rows_iter = range.rows();
        let Some(header_row) = rows_iter.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.iter().map(cell_to_header).collect();

        let raw_rows: Vec<Vec<DataType>> = rows_iter.map(|r| r.to_vec()).collect();
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnInfo {
                name: name.clone(),
                dtype: infer_cell_dtype(raw_rows.iter().filter_map(|r| r.get(i))),
            })
            .collect::<Vec<_>>();

        let rows: Vec<Vec<CellValue>> = raw_rows
            .iter()
            .map(|r| r.iter().map(cell_to_value).collect())
            .collect();

        sheets.push(SheetData {
            name: sheet_name,
            columns,
            rows,
        });
    }
    if sheets.is_empty() {
        return Err(Error::bad_request("workbook contains no sheets"));
    }
    Ok(sheets)
}

fn cell_to_header(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn infer_cell_dtype<'a>(values: impl Iterator<Item = &'a DataType>) -> String {
    let mut saw_any = false;
    let mut all_int = true;
    let mut all_float = true;
    for v in values {
        match v {
            DataType::Empty => continue,
            DataType::Int(_) => saw_any = true,
            DataType::Float(f) => {
                saw_any = true;
                if f.fract() != 0.0 {
                    all_int = false;
                }
            }
            _ => {
                saw_any = true;
                all_int = false;
                all_float = false;
            }
        }
    }
    if !saw_any {
        "text".to_string()
    } else if all_int {
        "integer".to_string()
    } else if all_float {
        "double".to_string()
    } else {
        "text".to_string()
    }
}

fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty => CellValue::Null,
        DataType::Int(i) => CellValue::Int(*i),
        DataType::Float(f) => CellValue::Float(*f),
        DataType::Bool(b) => CellValue::Text(b.to_string()),
        DataType::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_infers_integer_and_double_columns() {
        let csv = "company,total\nAcme,120.5\nGlobex,99.0\n";
        let sheets = detect_sheets(csv.as_bytes(), "report.csv").unwrap();
        assert_eq!(sheets.len(), 1);
        let sheet = &sheets[0];
        assert_eq!(sheet.name, "report");
        assert_eq!(sheet.columns[0].dtype, "text");
        assert_eq!(sheet.columns[1].dtype, "double");
        assert_eq!(sheet.rows.len(), 2);
    }

    #[test]
    fn csv_with_blank_cell_is_null_not_text() {
        let csv = "company,total\nAcme,\nGlobex,50\n";
        let sheets = detect_sheets(csv.as_bytes(), "report.csv").unwrap();
        let sheet = &sheets[0];
        assert_eq!(sheet.columns[1].dtype, "integer");
        match &sheet.rows[0][1] {
            CellValue::Null => {}
            other => panic!("expected null, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_extension_falls_through_to_workbook_parser_error() {
        let bogus = b"not a real workbook";
        let err = detect_sheets(bogus, "report.xlsx").unwrap_err();
        assert_eq!(err.kind, reportdeck_domain::ErrorKind::BadRequest);
    }
}
