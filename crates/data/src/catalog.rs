//! Dataset catalog (C9): `ingest` detects sheets, writes each to its own
//! SQLite file via `sheet_store`, and records a catalog entry; `resolve`
//! maps a caller-supplied hint to a `dataset_id`.
//!
//! Persistence follows `reportdeck-idempotency::IdempotencyStore`: the
//! whole catalog is loaded into memory once, mutated under a
//! `parking_lot::RwLock`, and flushed back out with atomic
//! temp-file-then-rename so a reader never observes a partially-written
//! catalog (§5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use reportdeck_domain::model::{ColumnInfo, Dataset, SheetInfo};
use reportdeck_domain::Error;

use crate::ingest::detect_sheets;
use crate::sheet_store;

pub struct Catalog {
    path: PathBuf,
    out_dir: PathBuf,
    entries: RwLock<HashMap<String, Dataset>>,
}

impl Catalog {
    /// Load (or create) the catalog at `out_dir/data/catalog.json`.
    pub fn new(out_dir: &Path) -> Result<Self, Error> {
        let data_dir = out_dir.join("data");
        std::fs::create_dir_all(&data_dir)?;
        let path = data_dir.join("catalog.json");
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            out_dir: out_dir.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    /// Detect sheets in `source_bytes`, write each to its own sheet store
    /// file, and record the resulting `Dataset` in the catalog.
    pub fn ingest(&self, source_bytes: &[u8], filename: &str) -> Result<Dataset, Error> {
        let sheets_data = detect_sheets(source_bytes, filename)?;
        let dataset_id = format!("ds_{}", random_hex8(source_bytes, filename));
        let dataset_dir = sheet_store::dataset_dir(&self.out_dir, &dataset_id);

        let mut sheets = Vec::with_capacity(sheets_data.len());
        for sheet in &sheets_data {
            let table_path = dataset_dir.join(format!("{}.sqlite", sheet.name));
            sheet_store::write_sheet(&table_path, &sheet.columns, &sheet.rows)?;
            sheets.push(SheetInfo {
                name: sheet.name.clone(),
                columns: sheet.columns.clone(),
                table_path: table_path.to_string_lossy().to_string(),
            });
        }

        let dataset = Dataset {
            dataset_id: dataset_id.clone(),
            source_name: filename.to_string(),
            sheets,
            created_at: chrono::Utc::now().timestamp(),
        };

        {
            let mut entries = self.entries.write();
            entries.insert(dataset_id, dataset.clone());
        }
        self.flush()?;
        Ok(dataset)
    }

    pub fn get(&self, dataset_id: &str) -> Option<Dataset> {
        self.entries.read().get(dataset_id).cloned()
    }

    /// Resolve `hint` to a `dataset_id`: tries it as a literal id, then
    /// as a source filename, then the sentinel `"latest"` (max
    /// `created_at`, ties broken by lexicographic id).
    pub fn resolve(&self, hint: &str) -> Option<String> {
        let entries = self.entries.read();
        if entries.contains_key(hint) {
            return Some(hint.to_string());
        }
        if let Some(ds) = entries.values().find(|d| d.source_name == hint) {
            return Some(ds.dataset_id.clone());
        }
        if hint == "latest" {
            return entries
                .values()
                .max_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.dataset_id.cmp(&b.dataset_id))
                })
                .map(|d| d.dataset_id.clone());
        }
        None
    }

    fn flush(&self) -> Result<(), Error> {
        let entries = self.entries.read();
        let json = serde_json::to_string_pretty(&*entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn random_hex8(source_bytes: &[u8], filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(source_bytes);
    hasher.update(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

pub fn sheet_columns(sheet: &SheetInfo) -> &[ColumnInfo] {
    &sheet.columns
}

pub fn load_rows(sheet: &SheetInfo, sql: &str, limit_rows: u64) -> Result<(Vec<String>, Vec<Vec<serde_json::Value>>), Error> {
    sheet_store::execute(Path::new(&sheet.table_path), sql, limit_rows)
}

pub fn validate_sql(sheet: &SheetInfo, sql: &str) -> Result<(), Error> {
    sheet_store::validate(Path::new(&sheet.table_path), sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_bytes() -> Vec<u8> {
        b"company,total\nAcme,120.5\nGlobex,99.0\n".to_vec()
    }

    #[test]
    fn ingest_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path()).unwrap();
        let dataset = catalog.ingest(&csv_bytes(), "report.csv").unwrap();
        assert!(dataset.dataset_id.starts_with("ds_"));
        assert_eq!(dataset.sheets.len(), 1);
        let got = catalog.get(&dataset.dataset_id).unwrap();
        assert_eq!(got.dataset_id, dataset.dataset_id);
    }

    #[test]
    fn resolve_by_literal_id_and_filename() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path()).unwrap();
        let dataset = catalog.ingest(&csv_bytes(), "report.csv").unwrap();

        assert_eq!(catalog.resolve(&dataset.dataset_id), Some(dataset.dataset_id.clone()));
        assert_eq!(catalog.resolve("report.csv"), Some(dataset.dataset_id.clone()));
    }

    #[test]
    fn resolve_latest_picks_max_created_at_tie_broken_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path()).unwrap();
        let first = catalog.ingest(&csv_bytes(), "a.csv").unwrap();
        let second = catalog.ingest(&csv_bytes(), "b.csv").unwrap();

        let expected = if (second.created_at, &second.dataset_id) >= (first.created_at, &first.dataset_id) {
            second.dataset_id.clone()
        } else {
            first.dataset_id.clone()
        };
        assert_eq!(catalog.resolve("latest").unwrap(), expected);
    }

    #[test]
    fn resolve_unknown_hint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path()).unwrap();
        assert!(catalog.resolve("nope").is_none());
    }

    #[test]
    fn catalog_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_id = {
            let catalog = Catalog::new(dir.path()).unwrap();
            catalog.ingest(&csv_bytes(), "report.csv").unwrap().dataset_id
        };
        let reopened = Catalog::new(dir.path()).unwrap();
        assert!(reopened.get(&dataset_id).is_some());
    }
}
