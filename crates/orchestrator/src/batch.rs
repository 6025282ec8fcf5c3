//! Batch mode (§4.11): process a list of `(name, text)` reports
//! sequentially through one [`Orchestrator`], never propagating a single
//! item's failure — each outcome is recorded instead.

use std::sync::Arc;
use std::time::Duration;

use crate::orchestrate::{deterministic_request_key, OrchestrateParams, Orchestrator};

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub name: String,
    pub ok: bool,
    pub url: Option<String>,
    pub error: Option<String>,
    pub created_slides: usize,
}

pub struct BatchOrchestrator {
    orchestrator: Arc<Orchestrator>,
    /// Optional pause between items, to avoid hammering the backends in a
    /// tight loop over a large batch (§4.11: "optional inter-item sleep").
    inter_item_delay: Option<Duration>,
}

impl BatchOrchestrator {
    pub fn new(orchestrator: Arc<Orchestrator>, inter_item_delay: Option<Duration>) -> Self {
        Self {
            orchestrator,
            inter_item_delay,
        }
    }

    /// Sequential by design (§4.11): batch mode trades fan-out parallelism
    /// for a single deterministic idempotency key per item, derived from
    /// the report text rather than the caller, so a re-run of the same
    /// batch is itself idempotent.
    pub async fn run(&self, items: &[BatchItem], slide_count: usize, use_cache: bool, cache_ttl_secs: i64) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                if let Some(delay) = self.inter_item_delay {
                    tokio::time::sleep(delay).await;
                }
            }

            let params = OrchestrateParams {
                report_text: item.text.clone(),
                client_request_id: Some(deterministic_request_key(&item.text)),
                slide_count,
                use_cache,
                cache_ttl_secs,
                data_questions: Vec::new(),
                dataset_id: None,
            };

            let outcome = match self.orchestrator.orchestrate(&params).await {
                Ok(result) => BatchOutcome {
                    name: item.name.clone(),
                    ok: true,
                    url: result.url,
                    error: None,
                    created_slides: result.created_slides,
                },
                Err(e) => {
                    tracing::error!(error = %e, item = %item.name, "batch: item failed, recording and continuing");
                    BatchOutcome {
                        name: item.name.clone(),
                        ok: false,
                        url: None,
                        error: Some(e.to_string()),
                        created_slides: 0,
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportdeck_domain::config::Config;
    use reportdeck_idempotency::IdempotencyStore;
    use reportdeck_retry::RetryPolicy;
    use reportdeck_tools::mock::{MockDeckBackend, MockImageBackend, MockSummarizerBackend};
    use reportdeck_tools::{ImageGenerateTool, SlidesCreateTool, SummarizeTool};

    fn section_response(title: &str) -> String {
        serde_json::json!({
            "sections": [{"title": title, "bullets": ["a", "b", "c"], "script": "s"}]
        })
        .to_string()
    }

    fn build_orchestrator(dir: &std::path::Path, responses: Vec<String>) -> Arc<Orchestrator> {
        let policy = RetryPolicy {
            attempts: 1,
            base: std::time::Duration::from_millis(1),
            cap: std::time::Duration::from_millis(1),
        };
        let idempotency = Arc::new(IdempotencyStore::new(dir).unwrap());
        let summarizer = Arc::new(SummarizeTool::new(Arc::new(MockSummarizerBackend::with_responses(responses)), policy));
        let image = Arc::new(ImageGenerateTool::new(
            Arc::new(MockImageBackend::with_images(vec![])),
            policy,
            dir.join("images"),
        ));
        let slides = Arc::new(SlidesCreateTool::new(Arc::new(MockDeckBackend::default()), idempotency, policy));
        let cache = Arc::new(reportdeck_cache::CacheStore::new(dir.join("cache")));
        Arc::new(Orchestrator::new(summarizer, image, slides, None, cache, &Config::default()))
    }

    #[tokio::test]
    async fn processes_items_sequentially_and_records_per_item_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build_orchestrator(dir.path(), vec![section_response("First"), section_response("Second")]);
        let batch = BatchOrchestrator::new(orchestrator, None);

        let items = vec![
            BatchItem {
                name: "report-a".into(),
                text: "text a".into(),
            },
            BatchItem {
                name: "report-b".into(),
                text: "text b".into(),
            },
        ];
        let outcomes = batch.run(&items, 1, false, 3600).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].ok);
        assert!(outcomes[1].ok);
        assert_eq!(outcomes[0].name, "report-a");
        assert_eq!(outcomes[1].name, "report-b");
    }

    #[tokio::test]
    async fn backend_exhaustion_on_one_item_is_captured_not_propagated() {
        let dir = tempfile::tempdir().unwrap();
        // Only one canned response for two items: the second exhausts the
        // mock queue and gets a BackendPermanent failure.
        let orchestrator = build_orchestrator(dir.path(), vec![section_response("Only")]);
        let batch = BatchOrchestrator::new(orchestrator, None);

        let items = vec![
            BatchItem {
                name: "ok".into(),
                text: "text a".into(),
            },
            BatchItem {
                name: "fails".into(),
                text: "text b".into(),
            },
        ];
        let outcomes = batch.run(&items, 1, false, 3600).await;

        assert!(outcomes[0].ok);
        assert!(!outcomes[1].ok);
        assert!(outcomes[1].error.is_some());
    }

    #[test]
    fn deterministic_key_is_stable_for_the_same_text() {
        let a = deterministic_request_key("same report text");
        let b = deterministic_request_key("same report text");
        assert_eq!(a, b);
        assert!(a.starts_with("req-"));
        assert_eq!(a.len(), "req-".len() + 16);
    }

    #[test]
    fn deterministic_key_differs_for_different_text() {
        assert_ne!(deterministic_request_key("a"), deterministic_request_key("b"));
    }
}
