//! `data.query` tool (C10), grounded in `data.py::data_query_tool`: load
//! schema, synthesize SQL (pattern first, then an LLM completion
//! fallback), sanitize, validate with a safe-query fallback on failure,
//! execute, render a chart, build a markdown table, and generate
//! insights — each stage soft-failing into the next rather than
//! aborting the whole request.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use reportdeck_domain::model::{ColumnInfo, Dataset};
use reportdeck_domain::Error;
use reportdeck_protocol::Tool;

use crate::catalog::Catalog;
use crate::chart;
use crate::nl2sql;
use crate::sheet_store;
use reportdeck_tools::backend::SummarizerBackend;

const TABLE_MAX_ROWS: usize = 12;
const TABLE_MAX_COLS: usize = 6;

/// The full pipeline outcome — a superset of the `data.query` wire result
/// (§6) carrying the raw columns/rows too, since `reportdeck-orchestrator`
/// (C11 mixed-mode) needs the structured data, not just the markdown
/// summary of it.
#[derive(Debug, Clone)]
pub struct DataQueryOutcome {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub chart_png_path: Option<String>,
    pub table_md: String,
    pub insights: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataQueryParams {
    pub dataset_id: String,
    pub question: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub limit_rows: Option<u64>,
}

pub struct DataQueryTool {
    catalog: Arc<Catalog>,
    summarizer: Arc<dyn SummarizerBackend>,
    out_dir: std::path::PathBuf,
    default_limit_rows: u64,
    max_limit_rows: u64,
}

impl DataQueryTool {
    pub fn new(
        catalog: Arc<Catalog>,
        summarizer: Arc<dyn SummarizerBackend>,
        out_dir: impl Into<std::path::PathBuf>,
        default_limit_rows: u64,
        max_limit_rows: u64,
    ) -> Self {
        Self {
            catalog,
            summarizer,
            out_dir: out_dir.into(),
            default_limit_rows,
            max_limit_rows,
        }
    }

    pub async fn query(&self, params: &DataQueryParams) -> DataQueryOutcome {
        let limit_rows = params.limit_rows.unwrap_or(self.default_limit_rows).min(self.max_limit_rows);

        let dataset = match self.catalog.get(&params.dataset_id) {
            Some(d) => d,
            None => {
                tracing::error!(dataset_id = %params.dataset_id, "data.query: unknown dataset");
                return degraded_result(&params.question, "unknown dataset_id");
            }
        };

        let Some(sheet) = dataset.sheet(params.sheet.as_deref()) else {
            tracing::error!(dataset_id = %params.dataset_id, "data.query: dataset has no sheets");
            return degraded_result(&params.question, "dataset has no sheets");
        };
        let table_path = Path::new(&sheet.table_path);

        let sql = self.synthesize_sql(&params.question, &sheet.columns).await;
        let sql = match nl2sql::sanitize_sql(&sql) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "data.query: sql rejected by sanitizer");
                return degraded_result(&params.question, &e.to_string());
            }
        };

        let sql = self.validate_or_fallback(table_path, &sql, limit_rows);

        let (columns, rows) = match sheet_store::execute(table_path, &sql, limit_rows) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "data.query: execution failed");
                return degraded_result(&params.question, &e.to_string());
            }
        };

        let chart_path = self.render_chart(&dataset, &params.question, &columns, &rows);
        let table_md = to_table_md(&columns, &rows);
        let insights = self.insights(&params.question, &columns, &rows).await;

        DataQueryOutcome {
            sql,
            columns,
            rows,
            chart_png_path: chart_path,
            table_md,
            insights,
        }
    }

    /// §4.10 step 2-3: pattern match first; only ask the backend when no
    /// fixed shape matched, mirroring `_nl2sql`'s "fallback to LLM or
    /// heuristic".
    async fn synthesize_sql(&self, question: &str, columns: &[ColumnInfo]) -> String {
        if let Some(sql) = nl2sql::try_pattern_sql(question, columns) {
            return sql;
        }
        match self.llm_sql(question, columns).await {
            Ok(sql) => sql,
            Err(e) => {
                tracing::warn!(error = %e, "data.query: llm sql fallback failed, using heuristic");
                nl2sql::fallback_query(columns)
            }
        }
    }

    async fn llm_sql(&self, question: &str, columns: &[ColumnInfo]) -> Result<String, Error> {
        let schema_str = columns
            .iter()
            .map(|c| format!("- {} ({})", c.name, c.dtype))
            .collect::<Vec<_>>()
            .join("\n");
        let col_names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "You are a SQL generator for SQLite. Given a table t with columns:\n{schema_str}\n\nWrite a single SELECT (or WITH ... SELECT) that answers the question:\nQ: {question}\n\nRules:\n- Only SELECT/WITH, no DDL/DML.\n- Column names are case-sensitive: {col_names}\n- Prefer aggregates and top-10 where appropriate.\n- If no obvious grouping, return the most informative rows.\n- Always include a LIMIT 5000 at the end if not present.\n- Use exact column names from the schema above.\n\nReturn ONLY the SQL, nothing else."
        );
        let raw = self.summarizer.complete(&prompt).await?;
        let cleaned = raw.trim().trim_start_matches("```sql").trim_start_matches("```").trim_end_matches("```").trim();
        Ok(cleaned.to_string())
    }

    /// §4.10 step 5: validate via `EXPLAIN`; on failure fall back to a
    /// safe `SELECT * ... LIMIT min(50, limit_rows)`.
    fn validate_or_fallback(&self, table_path: &Path, sql: &str, limit_rows: u64) -> String {
        match sheet_store::validate(table_path, sql) {
            Ok(()) => sql.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, sql, "data.query: sql failed validation, using safe fallback");
                format!("SELECT * FROM t LIMIT {}", limit_rows.min(50))
            }
        }
    }

    fn render_chart(&self, dataset: &Dataset, question: &str, columns: &[String], rows: &[Vec<Value>]) -> Option<String> {
        let path = chart::chart_png_path(&self.out_dir, &dataset.dataset_id, question);
        match chart::render(columns, rows, &path) {
            Ok(Some(p)) => Some(p.to_string_lossy().to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "data.query: chart rendering failed");
                None
            }
        }
    }

    /// §4.10 step 9: ask the backend for 2-4 short factual bullets over a
    /// CSV sample of the first 10 rows; any failure degrades to a canned
    /// two-line summary.
    async fn insights(&self, question: &str, columns: &[String], rows: &[Vec<Value>]) -> Vec<String> {
        let sample = rows_to_csv(columns, rows, 10);
        let prompt = format!(
            "Given this question and CSV sample rows, write 2-4 short, factual bullets (<= 350 chars total).\n\nQ: {question}\n\nCSV:\n{sample}"
        );
        match self.summarizer.complete(&prompt).await {
            Ok(text) => {
                let bullets: Vec<String> = text
                    .lines()
                    .map(|l| l.trim_start_matches(['-', '*', '.', ' ']).trim().to_string())
                    .filter(|l| !l.is_empty())
                    .take(4)
                    .collect();
                if bullets.is_empty() {
                    vec![format!("Result has {} rows.", rows.len())]
                } else {
                    bullets
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "data.query: insights generation failed");
                vec![
                    format!("Answered: {question}"),
                    format!("Found {} results with {} columns", rows.len(), columns.len()),
                ]
            }
        }
    }
}

fn rows_to_csv(columns: &[String], rows: &[Vec<Value>], max_rows: usize) -> String {
    let mut out = columns.join(",");
    out.push('\n');
    for row in rows.iter().take(max_rows) {
        let cells: Vec<String> = row.iter().map(value_to_csv_cell).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn value_to_csv_cell(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// §4.10 step 9 markdown table, capped at 12 rows × 6 columns.
fn to_table_md(columns: &[String], rows: &[Vec<Value>]) -> String {
    let cols: Vec<&String> = columns.iter().take(TABLE_MAX_COLS).collect();
    let header = format!("| {} |", cols.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" | "));
    let sep = format!("| {} |", cols.iter().map(|_| "---").collect::<Vec<_>>().join(" | "));
    let mut lines = vec![header, sep];
    for row in rows.iter().take(TABLE_MAX_ROWS) {
        let cells: Vec<String> = row.iter().take(TABLE_MAX_COLS).map(value_to_csv_cell).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}

/// Last-resort result when a stage fails past the load boundary (§4.10:
/// the original returns `{"sql": "-- Failed: ...", ...}` rather than
/// propagating the error).
fn degraded_result(question: &str, reason: &str) -> DataQueryOutcome {
    DataQueryOutcome {
        sql: format!("-- Failed: {question}"),
        columns: Vec::new(),
        rows: Vec::new(),
        chart_png_path: None,
        table_md: format!("Error processing query: {question}"),
        insights: vec![
            format!("Could not process: {question}"),
            format!("Error: {}", reason.chars().take(100).collect::<String>()),
        ],
    }
}

#[async_trait]
impl Tool for DataQueryTool {
    fn method_name(&self) -> &str {
        "data.query"
    }

    async fn call(&self, params: Value) -> Result<Value, Error> {
        let params: DataQueryParams = serde_json::from_value(params)
            .map_err(|e| Error::bad_request(format!("invalid data.query params: {e}")))?;
        let outcome = self.query(&params).await;
        Ok(serde_json::json!({
            "chart_png_path": outcome.chart_png_path,
            "table_md": outcome.table_md,
            "insights": outcome.insights,
            "sql": outcome.sql,
        }))
    }
}
