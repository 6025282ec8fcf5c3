//! Pattern-based NL→SQL synthesis (C10 steps 2-3), grounded in
//! `data.py::_nl2sql` / `_find_best_column_match` / `_fallback_query` /
//! `_sanitize_sql`.
//!
//! Patterns are tried in a fixed order — group-by, top-N, sum, average —
//! and the first one whose regex matches the (lowercased) question wins.
//! None of this touches a backend; the LLM-completion fallback lives one
//! layer up, in `crate::query`, because it needs a [`SummarizerBackend`]
//! handle this module has no business holding.

use regex::Regex;
use std::sync::OnceLock;

use reportdeck_domain::model::ColumnInfo;

fn group_by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\w+)\s+by\s+(\w+)").unwrap())
}

fn top_n_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\btop\s+(\d+)\s+(\w+)").unwrap())
}

fn sum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:total|sum)\s+(\w+)").unwrap())
}

fn avg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:average|avg)\s+(\w+)").unwrap())
}

/// Attempt pattern-based synthesis. `None` means none of the fixed
/// shapes matched and the caller should fall back to an LLM completion
/// or [`fallback_query`].
pub fn try_pattern_sql(question: &str, columns: &[ColumnInfo]) -> Option<String> {
    let q = question.to_lowercase();
    let col_names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

    if let Some(caps) = group_by_re().captures(&q) {
        return Some(build_group_by_query(&caps[1], &caps[2], &col_names));
    }
    if let Some(caps) = top_n_re().captures(&q) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return Some(build_top_n_query(n, &caps[2], &col_names));
        }
    }
    if let Some(caps) = sum_re().captures(&q) {
        return Some(build_sum_query(&caps[1], &col_names));
    }
    if let Some(caps) = avg_re().captures(&q) {
        return Some(build_avg_query(&caps[1], &col_names));
    }
    None
}

fn build_sum_query(target_col: &str, col_names: &[&str]) -> String {
    let target = find_best_column_match(target_col, col_names);
    format!("SELECT SUM(\"{target}\") as total_{target} FROM t")
}

fn build_group_by_query(measure_col: &str, group_col: &str, col_names: &[&str]) -> String {
    let measure = find_best_column_match(measure_col, col_names);
    let group = find_best_column_match(group_col, col_names);
    format!("SELECT \"{group}\", SUM(\"{measure}\") as total_{measure} FROM t GROUP BY \"{group}\" ORDER BY 2 DESC LIMIT 10")
}

fn build_top_n_query(n: u32, col: &str, col_names: &[&str]) -> String {
    let target = find_best_column_match(col, col_names);
    let capped = n.min(100);
    format!("SELECT * FROM t ORDER BY \"{target}\" DESC LIMIT {capped}")
}

fn build_avg_query(target_col: &str, col_names: &[&str]) -> String {
    let target = find_best_column_match(target_col, col_names);
    format!("SELECT AVG(\"{target}\") as avg_{target} FROM t")
}

/// Column-targeting similarity heuristic: synonym map, then exact
/// case-insensitive match, then substring match, then the first column.
fn find_best_column_match(target: &str, col_names: &[&str]) -> String {
    let target_lower = target.to_lowercase();

    if let Some(preferred) = synonyms(&target_lower) {
        for candidate in preferred {
            if let Some(col) = col_names.iter().find(|c| c.to_lowercase().contains(candidate)) {
                return col.to_string();
            }
        }
    }

    if let Some(col) = col_names.iter().find(|c| c.to_lowercase() == target_lower) {
        return col.to_string();
    }

    if let Some(col) = col_names
        .iter()
        .find(|c| c.to_lowercase().contains(&target_lower) || target_lower.contains(&c.to_lowercase()))
    {
        return col.to_string();
    }

    col_names.first().map(|c| c.to_string()).unwrap_or_else(|| "id".to_string())
}

/// Synonym groups, extended beyond the original's sales/company pairs
/// with date/time and count/quantity groups (questions phrased as
/// "total qty by date" are as common as "total sales by company").
fn synonyms(target_lower: &str) -> Option<&'static [&'static str]> {
    match target_lower {
        "sales" => Some(&["total", "revenue", "amount", "sales"]),
        "total" => Some(&["total", "amount", "revenue", "sales"]),
        "revenue" => Some(&["total", "revenue", "amount", "sales"]),
        "company" | "companies" => Some(&["company", "customer", "client", "name"]),
        "date" | "time" => Some(&["date", "time", "created"]),
        "count" | "qty" | "quantity" => Some(&["count", "qty", "quantity"]),
        _ => None,
    }
}

/// Last-resort query shape when no pattern matched and no LLM completion
/// is available: group the first non-numeric column by the first numeric
/// one, or `SELECT *` if the table has neither.
pub fn fallback_query(columns: &[ColumnInfo]) -> String {
    let cat = columns.iter().find(|c| !is_numeric_dtype(&c.dtype)).map(|c| c.name.as_str());
    let num = columns.iter().find(|c| is_numeric_dtype(&c.dtype)).map(|c| c.name.as_str());
    match (cat, num) {
        (Some(cat), Some(num)) => {
            format!("SELECT \"{cat}\" AS category, SUM(\"{num}\") AS value FROM t GROUP BY 1 ORDER BY 2 DESC LIMIT 10")
        }
        _ => "SELECT * FROM t LIMIT 50".to_string(),
    }
}

fn is_numeric_dtype(dtype: &str) -> bool {
    matches!(dtype, "integer" | "double")
}

fn ddl_dml_guard() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|REPLACE|MERGE)\b").unwrap())
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--.*").unwrap())
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

fn limit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blimit\b").unwrap())
}

/// Strip comments, reject any query touching DDL/DML, and append a
/// `LIMIT 5000` if the query doesn't already have one.
pub fn sanitize_sql(sql: &str) -> Result<String, reportdeck_domain::Error> {
    let stripped = line_comment_re().replace_all(sql, "");
    let stripped = block_comment_re().replace_all(&stripped, "");
    if ddl_dml_guard().is_match(&stripped) {
        return Err(reportdeck_domain::Error::bad_request(
            "only SELECT/WITH queries are allowed",
        ));
    }
    let trimmed = stripped.trim().to_string();
    if limit_re().is_match(&trimmed) {
        Ok(trimmed)
    } else {
        Ok(format!("{} LIMIT 5000", trimmed.trim_end_matches(';')))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo {
                name: "company".into(),
                dtype: "text".into(),
            },
            ColumnInfo {
                name: "total_sales".into(),
                dtype: "double".into(),
            },
        ]
    }

    #[test]
    fn group_by_pattern_wins_over_other_patterns() {
        let sql = try_pattern_sql("total sales by company", &cols()).unwrap();
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("company"));
        assert!(sql.contains("total_sales"));
    }

    #[test]
    fn top_n_pattern_caps_at_100() {
        let sql = try_pattern_sql("top 500 company", &cols()).unwrap();
        assert!(sql.contains("LIMIT 100"));
    }

    #[test]
    fn sum_pattern_targets_synonym_column() {
        let sql = try_pattern_sql("total sales", &cols()).unwrap();
        assert!(sql.starts_with("SELECT SUM("));
        assert!(sql.contains("total_sales"));
    }

    #[test]
    fn average_pattern_matches() {
        let sql = try_pattern_sql("average sales", &cols()).unwrap();
        assert!(sql.starts_with("SELECT AVG("));
    }

    #[test]
    fn unmatched_question_returns_none() {
        assert!(try_pattern_sql("what is happening", &cols()).is_none());
    }

    #[test]
    fn fallback_query_groups_category_by_numeric() {
        let sql = fallback_query(&cols());
        assert!(sql.contains("GROUP BY 1"));
    }

    #[test]
    fn fallback_query_selects_star_when_no_numeric_column() {
        let cols = vec![ColumnInfo {
            name: "notes".into(),
            dtype: "text".into(),
        }];
        assert_eq!(fallback_query(&cols), "SELECT * FROM t LIMIT 50");
    }
}
