//! Orchestrator (C11, §4.11): plan N slides from a report, fan out to the
//! summarizer/image/deck tools, merge, and surface partial failure.
//!
//! Grounded in `mcp_lab/orchestrator.py`'s single-slide flow (derive a
//! request id, summarize, best-effort image, `slides.create`), generalized
//! to `sections[]` per SPEC_FULL.md §C.1: the request id becomes a per-slide
//! key `"<request_id>#s<i>"`, and slides are appended one after another onto
//! the same presentation rather than created once.

pub mod batch;
pub mod orchestrate;

pub use batch::{BatchItem, BatchOutcome, BatchOrchestrator};
pub use orchestrate::{OrchestrateParams, OrchestrateResult, Orchestrator};
