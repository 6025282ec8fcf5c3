//! Dataset ingest, catalog, and NL→SQL→chart/insights pipeline (C9, C10).

pub mod catalog;
pub mod chart;
pub mod ingest;
pub mod nl2sql;
pub mod query;
pub mod sheet_store;

pub use catalog::Catalog;
pub use query::{DataQueryOutcome, DataQueryParams, DataQueryTool};
