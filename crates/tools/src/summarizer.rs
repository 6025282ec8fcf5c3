//! `llm.summarize` tool (C6, §4.6).
//!
//! Grounded in `mcp/tools/llm.py`: the two-block prompt shape
//! (instructions, then a literal `--- RESEARCH TEXT ---` marker, then the
//! report body) and the "retry on JSON/schema failure" loop are kept
//! verbatim in spirit, generalized from one section to `sections[]`
//! (SPEC_FULL.md §C.1).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use reportdeck_domain::model::{SummarizerOutput, DEFAULT_MAX_SCRIPT_CHARS, MAX_SECTIONS};
use reportdeck_domain::{Error, ErrorKind};
use reportdeck_protocol::Tool;
use reportdeck_retry::{retry, RetryPolicy};

use crate::backend::SummarizerBackend;

const SYSTEM_INSTRUCTIONS: &str = "You are a presentation research assistant. Read the report text below and return a single JSON object shaped exactly like: {\"sections\":[{\"title\":\"...\",\"subtitle\":\"...\",\"bullets\":[\"...\"],\"script\":\"...\",\"image_prompt\":\"...\"}]}. Produce at most MAX_SECTIONS sections, each with 3-8 short bullets, a presenter script of at most MAX_SCRIPT_CHARS characters, and an image_prompt suitable for a modern, professional illustration. Return JSON only, no commentary, no markdown fences.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizeParams {
    pub report_text: String,
    #[serde(default = "default_max_bullets")]
    pub max_bullets: usize,
    #[serde(default = "default_max_script_chars")]
    pub max_script_chars: usize,
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
}

fn default_max_bullets() -> usize {
    5
}
fn default_max_script_chars() -> usize {
    DEFAULT_MAX_SCRIPT_CHARS
}
fn default_max_sections() -> usize {
    MAX_SECTIONS
}

/// §4.6 step 1: build the deterministic two-block prompt.
fn build_prompt(p: &SummarizeParams) -> String {
    let instructions = SYSTEM_INSTRUCTIONS
        .replace("MAX_SECTIONS", &p.max_sections.to_string())
        .replace("MAX_SCRIPT_CHARS", &p.max_script_chars.to_string());
    format!("{instructions}\n\n--- RESEARCH TEXT ---\n{}", p.report_text)
}

/// §4.6 step 3: strip a ``` ... ``` fence, with or without a language tag.
fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// §4.6 step 6: "always retryable for parse/validation errors" plus the
/// usual backend-transient condition from §4.5.
fn retryable(e: &Error) -> bool {
    matches!(e.kind, ErrorKind::InvalidOutput) || e.is_retryable()
}

pub struct SummarizeTool {
    backend: Arc<dyn SummarizerBackend>,
    policy: RetryPolicy,
}

impl SummarizeTool {
    pub fn new(backend: Arc<dyn SummarizerBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// The core algorithm, independent of the JSON-RPC params envelope, so
    /// the orchestrator can call it directly when wrapping with the cache
    /// (§4.11 step 2 keys the cache on the same inputs this takes).
    pub async fn summarize(&self, params: &SummarizeParams) -> Result<SummarizerOutput, Error> {
        let prompt = build_prompt(params);
        let max_sections = params.max_sections.min(MAX_SECTIONS).max(1);
        let max_script_chars = params.max_script_chars;

        let mut out = retry(&self.policy, retryable, |_attempt| {
            let prompt = prompt.clone();
            async {
                let raw = self.backend.summarize(&prompt).await?;
                let stripped = strip_code_fence(&raw);
                let value: Value = serde_json::from_str(stripped)
                    .map_err(|e| Error::invalid_output(format!("malformed JSON: {e}")))?;
                SummarizerOutput::from_json_value(value)
            }
        })
        .await?;

        for section in &mut out.sections {
            section.clamp_script(max_script_chars);
        }
        out.sections.truncate(max_sections);
        Ok(out)
    }
}

#[async_trait]
impl Tool for SummarizeTool {
    fn method_name(&self) -> &str {
        "llm.summarize"
    }

    async fn call(&self, params: Value) -> Result<Value, Error> {
        let params: SummarizeParams = serde_json::from_value(params)
            .map_err(|e| Error::bad_request(format!("invalid llm.summarize params: {e}")))?;
        let out = self.summarize(&params).await?;
        serde_json::to_value(out).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSummarizerBackend;

    #[tokio::test]
    async fn strips_fence_and_parses_single_section() {
        let backend = Arc::new(MockSummarizerBackend::with_responses(vec![
            "```json\n{\"title\":\"T\",\"bullets\":[\"a\",\"b\",\"c\"],\"script\":\"s\"}\n```".to_string(),
        ]));
        let tool = SummarizeTool::new(backend, RetryPolicy::default());
        let out = tool
            .summarize(&SummarizeParams {
                report_text: "report".into(),
                max_bullets: 5,
                max_script_chars: 700,
                max_sections: 10,
            })
            .await
            .unwrap();
        assert_eq!(out.sections.len(), 1);
        assert_eq!(out.sections[0].title, "T");
    }

    #[tokio::test]
    async fn retries_on_invalid_json_then_succeeds() {
        let backend = Arc::new(MockSummarizerBackend::with_responses(vec![
            "not json at all".to_string(),
            "{\"title\":\"T\",\"bullets\":[\"a\",\"b\",\"c\"],\"script\":\"s\"}".to_string(),
        ]));
        let tool = SummarizeTool::new(
            backend.clone(),
            RetryPolicy {
                attempts: 4,
                base: std::time::Duration::from_millis(1),
                cap: std::time::Duration::from_millis(5),
            },
        );
        let out = tool
            .summarize(&SummarizeParams {
                report_text: "report".into(),
                max_bullets: 5,
                max_script_chars: 700,
                max_sections: 10,
            })
            .await
            .unwrap();
        assert_eq!(out.sections.len(), 1);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_invalid_output() {
        let backend = Arc::new(MockSummarizerBackend::with_responses(vec![
            "garbage".to_string(),
            "garbage".to_string(),
            "garbage".to_string(),
            "garbage".to_string(),
        ]));
        let tool = SummarizeTool::new(
            backend,
            RetryPolicy {
                attempts: 4,
                base: std::time::Duration::from_millis(1),
                cap: std::time::Duration::from_millis(5),
            },
        );
        let err = tool
            .summarize(&SummarizeParams {
                report_text: "report".into(),
                max_bullets: 5,
                max_script_chars: 700,
                max_sections: 10,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOutput);
    }

    #[tokio::test]
    async fn script_is_clamped_to_max_script_chars() {
        let long_script = "x".repeat(800);
        let backend = Arc::new(MockSummarizerBackend::with_responses(vec![format!(
            "{{\"title\":\"T\",\"bullets\":[\"a\",\"b\",\"c\"],\"script\":\"{long_script}\"}}"
        )]));
        let tool = SummarizeTool::new(backend, RetryPolicy::default());
        let out = tool
            .summarize(&SummarizeParams {
                report_text: "report".into(),
                max_bullets: 5,
                max_script_chars: 100,
                max_sections: 10,
            })
            .await
            .unwrap();
        assert_eq!(out.sections[0].script.chars().count(), 100);
    }

    #[tokio::test]
    async fn sections_beyond_max_sections_are_truncated() {
        let sections: Vec<_> = (0..8)
            .map(|i| {
                serde_json::json!({"title": format!("t{i}"), "bullets": ["a","b","c"], "script": "s"})
            })
            .collect();
        let body = serde_json::json!({ "sections": sections }).to_string();
        let backend = Arc::new(MockSummarizerBackend::with_responses(vec![body]));
        let tool = SummarizeTool::new(backend, RetryPolicy::default());
        let out = tool
            .summarize(&SummarizeParams {
                report_text: "report".into(),
                max_bullets: 5,
                max_script_chars: 700,
                max_sections: 3,
            })
            .await
            .unwrap();
        assert_eq!(out.sections.len(), 3);
    }

    #[test]
    fn unknown_params_are_rejected() {
        let v = serde_json::json!({"report_text": "x", "bogus": 1});
        let err = serde_json::from_value::<SummarizeParams>(v).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.to_string().contains("unknown field"));
    }

    #[tokio::test]
    async fn dispatch_via_tool_trait() {
        let backend = Arc::new(MockSummarizerBackend::with_responses(vec![
            "{\"title\":\"T\",\"bullets\":[\"a\",\"b\",\"c\"],\"script\":\"s\"}".to_string(),
        ]));
        let tool = SummarizeTool::new(backend, RetryPolicy::default());
        let result = tool
            .call(serde_json::json!({"report_text": "report"}))
            .await
            .unwrap();
        assert_eq!(result["sections"][0]["title"], "T");
    }
}
