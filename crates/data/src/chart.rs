//! Chart-kind selection and rendering (C10 steps 7-8), grounded in
//! `data.py::_choose_chart` / `_render_chart`. Matplotlib's `plt.bar` /
//! `plt.plot` become `plotters`' `ChartBuilder` + `BitMapBackend`; the
//! 8×4.5in @ 150dpi figure size becomes a 1200×675px bitmap.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use serde_json::Value;

use reportdeck_domain::Error;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 675;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    SingleValueBar,
    SingleColBar,
    Line,
    Bar,
    Table,
}

/// Pick a chart kind from the result shape, mirroring the original's
/// column-count/row-count decision tree (Table means "render nothing,
/// the markdown table already says it all").
pub fn choose_chart(columns: &[String], rows: &[Vec<Value>]) -> ChartKind {
    let ncols = columns.len();
    let nrows = rows.len();

    if ncols == 1 && nrows == 1 {
        return ChartKind::SingleValueBar;
    }
    if ncols == 1 && nrows > 1 {
        return ChartKind::SingleColBar;
    }
    if ncols >= 2 && nrows > 1 {
        let has_numeric = (0..ncols).any(|i| column_is_numeric(rows, i));
        if has_numeric {
            if column_looks_like_date(columns.first().map(String::as_str).unwrap_or("")) {
                return ChartKind::Line;
            }
            return ChartKind::Bar;
        }
    }
    if ncols == 2 && (1..=10).contains(&nrows) {
        let has_numeric = (0..ncols).any(|i| column_is_numeric(rows, i));
        if has_numeric {
            return ChartKind::Bar;
        }
    }
    if ncols == 1 && nrows > 1 && nrows <= 20 {
        return ChartKind::SingleColBar;
    }
    ChartKind::Table
}

fn column_is_numeric(rows: &[Vec<Value>], idx: usize) -> bool {
    rows.iter().all(|r| matches!(r.get(idx), Some(Value::Number(_)) | Some(Value::Null)))
}

fn column_looks_like_date(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("date") || lower.contains("time")
}

/// Index of the first numeric column, falling back to column 1 — only
/// called from the `Bar`/`Line` paths, which `choose_chart` never picks
/// for fewer than two columns.
fn numeric_y_col(columns: &[String], rows: &[Vec<Value>]) -> usize {
    (0..columns.len()).find(|&i| column_is_numeric(rows, i)).unwrap_or(1)
}

fn as_f64(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

fn label_for(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "".to_string(),
        other => other.to_string(),
    }
}

/// Render `rows` to `path` as a PNG. Returns `Ok(None)` (no file written)
/// when the chosen kind is [`ChartKind::Table`] — a bare markdown table
/// communicates the result as well as a chart would.
pub fn render(columns: &[String], rows: &[Vec<Value>], path: &Path) -> Result<Option<PathBuf>, Error> {
    let kind = choose_chart(columns, rows);
    if kind == ChartKind::Table {
        return Ok(None);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    match kind {
        ChartKind::SingleValueBar => render_single_value_bar(&root, columns, rows)?,
        ChartKind::SingleColBar => render_single_col_bar(&root, columns, rows)?,
        ChartKind::Line => render_line(&root, columns, rows)?,
        ChartKind::Bar => render_bar(&root, columns, rows)?,
        ChartKind::Table => unreachable!(),
    }

    root.present().map_err(chart_err)?;
    Ok(Some(path.to_path_buf()))
}

fn render_single_value_bar(
    root: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<(), Error> {
    let label = columns.first().cloned().unwrap_or_default();
    let value = rows.first().and_then(|r| r.first()).map(as_f64).unwrap_or(0.0);
    let max_y = (value.abs() * 1.2).max(1.0);

    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .caption(format!("{label}: {value:.0}"), ("sans-serif", 22))
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d((0..1).into_segmented(), 0f64..max_y)
        .map_err(chart_err)?;
    chart.configure_mesh().disable_x_mesh().y_desc("Value").draw().map_err(chart_err)?;
    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(SegmentValue::Exact(0), 0.0), (SegmentValue::Exact(1), value)],
            BLUE.filled(),
        )))
        .map_err(chart_err)?;
    Ok(())
}

fn render_single_col_bar(
    root: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<(), Error> {
    let label = columns.first().cloned().unwrap_or_default();
    let values: Vec<f64> = rows.iter().map(|r| r.first().map(as_f64).unwrap_or(0.0)).collect();
    let max_y = values.iter().cloned().fold(0.0_f64, f64::max).max(1.0) * 1.1;

    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .caption(&label, ("sans-serif", 22))
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0..values.len().max(1), 0f64..max_y)
        .map_err(chart_err)?;
    chart.configure_mesh().x_desc("Item").y_desc(&label).draw().map_err(chart_err)?;
    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            let mut bar = Rectangle::new([(i, 0.0), (i + 1, *v)], BLUE.filled());
            bar.set_margin(0, 0, 2, 2);
            bar
        }))
        .map_err(chart_err)?;
    Ok(())
}

fn render_line(
    root: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<(), Error> {
    let y_idx = numeric_y_col(columns, rows);
    let x_labels: Vec<String> = rows.iter().map(|r| label_for(r.first().unwrap_or(&Value::Null))).collect();
    let values: Vec<f64> = rows.iter().map(|r| r.get(y_idx).map(as_f64).unwrap_or(0.0)).collect();
    let max_y = values.iter().cloned().fold(0.0_f64, f64::max).max(1.0) * 1.1;

    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .caption(columns.get(y_idx).cloned().unwrap_or_default(), ("sans-serif", 22))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..values.len().max(1), 0f64..max_y)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc(columns.first().cloned().unwrap_or_default())
        .x_label_formatter(&|i| x_labels.get(*i).cloned().unwrap_or_default())
        .draw()
        .map_err(chart_err)?;
    chart
        .draw_series(LineSeries::new(values.iter().enumerate().map(|(i, v)| (i, *v)), &BLUE))
        .map_err(chart_err)?;
    Ok(())
}

fn render_bar(
    root: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<(), Error> {
    let y_idx = numeric_y_col(columns, rows);
    let x_labels: Vec<String> = rows.iter().map(|r| label_for(r.first().unwrap_or(&Value::Null))).collect();
    let values: Vec<f64> = rows.iter().map(|r| r.get(y_idx).map(as_f64).unwrap_or(0.0)).collect();
    let max_y = values.iter().cloned().fold(0.0_f64, f64::max).max(1.0) * 1.1;

    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .caption(columns.get(y_idx).cloned().unwrap_or_default(), ("sans-serif", 22))
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(0..values.len().max(1), 0f64..max_y)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc(columns.first().cloned().unwrap_or_default())
        .x_label_formatter(&|i| x_labels.get(*i).cloned().unwrap_or_default())
        .draw()
        .map_err(chart_err)?;
    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            let mut bar = Rectangle::new([(i, 0.0), (i + 1, *v)], BLUE.filled());
            bar.set_margin(0, 0, 2, 2);
            bar
        }))
        .map_err(chart_err)?;
    Ok(())
}

fn chart_err<E: std::fmt::Display>(e: E) -> Error {
    Error::backend_permanent(format!("chart rendering failed: {e}"))
}

/// `<out>/charts/<dataset_id>/<question_hash8>.png` (§4.10 step 8).
pub fn chart_png_path(out_dir: &Path, dataset_id: &str, question: &str) -> PathBuf {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    let digest = hasher.finalize();
    let hash8 = hex::encode(&digest[..4]);
    out_dir.join("charts").join(dataset_id).join(format!("{hash8}.png"))
}
