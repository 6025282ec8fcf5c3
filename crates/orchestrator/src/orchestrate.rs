//! Single-request orchestration: report-only and mixed (report + data
//! question) planning, fan-out, and merge (§4.11 steps 1-5, mixed mode).

use std::sync::Arc;

use sha2::{Digest, Sha256};

use reportdeck_domain::config::Config;
use reportdeck_domain::model::{ImageArtifact, Section, MAX_TITLE_CHARS};
use reportdeck_domain::Error;
use reportdeck_idempotency::IdempotencyStore;
use reportdeck_tools::{
    ImageGenerateParams, ImageGenerateTool, SlidesCreateParams, SlidesCreateTool, SummarizeParams, SummarizeTool,
};

const SUMMARIZER_CACHE_NS: &str = "llm_summarize";
const IMAGE_CACHE_NS: &str = "image_generate";
const MAX_SLIDE_COUNT: usize = 10;

/// Inputs to one orchestration request (§4.11).
#[derive(Debug, Clone)]
pub struct OrchestrateParams {
    pub report_text: String,
    pub client_request_id: Option<String>,
    /// Requested slide count; clamped to `1..=10`.
    pub slide_count: usize,
    pub use_cache: bool,
    pub cache_ttl_secs: i64,
    /// Mixed mode (§4.11): one `data.query` call per question.
    pub data_questions: Vec<String>,
    pub dataset_id: Option<String>,
}

/// Output of one orchestration request (§4.11). A request whose planner
/// produced zero sections returns a "null result": every field empty and
/// `created_slides == 0`, not an error.
#[derive(Debug, Clone, Default)]
pub struct OrchestrateResult {
    pub presentation_id: Option<String>,
    pub url: Option<String>,
    pub created_slides: usize,
    pub first_slide_id: Option<String>,
}

/// How a planned slide's image is sourced, decided before the per-slide
/// loop so the loop itself only has to resolve, never branch on mode.
enum SlideImage {
    /// Generate on demand from an `image_prompt` (best-effort, cached).
    Generate(String),
    /// Already rendered to disk (a data-question chart) — no backend call.
    Prebuilt(String),
    None,
}

pub struct Orchestrator {
    summarizer: Arc<SummarizeTool>,
    image: Arc<ImageGenerateTool>,
    slides: Arc<SlidesCreateTool>,
    data_query: Option<Arc<reportdeck_data::DataQueryTool>>,
    cache: Arc<reportdeck_cache::CacheStore>,
    max_bullets: usize,
    max_script_chars: usize,
    max_sections: usize,
    summarizer_model_id: String,
    image_model_id: String,
    image_aspect: String,
    image_shared_public: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        summarizer: Arc<SummarizeTool>,
        image: Arc<ImageGenerateTool>,
        slides: Arc<SlidesCreateTool>,
        data_query: Option<Arc<reportdeck_data::DataQueryTool>>,
        cache: Arc<reportdeck_cache::CacheStore>,
        config: &Config,
    ) -> Self {
        Self {
            summarizer,
            image,
            slides,
            data_query,
            cache,
            max_bullets: config.summarizer.max_bullets,
            max_script_chars: config.summarizer.max_script_chars,
            max_sections: config.summarizer.max_sections,
            summarizer_model_id: config.summarizer.model_id.clone(),
            image_model_id: config.image.model_id.clone(),
            image_aspect: config.deck.default_aspect.clone(),
            image_shared_public: config.image.shared_public_default,
        }
    }

    /// §4.11: derive the request id, plan sections (report-only or mixed),
    /// then fan out slide by slide, appending onto one presentation.
    pub async fn orchestrate(&self, params: &OrchestrateParams) -> Result<OrchestrateResult, Error> {
        let request_id = params
            .client_request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // Step 2: summarizer failure is fatal — no slides can be planned.
        let summarized = self
            .summarize_cached(&params.report_text, params.use_cache, params.cache_ttl_secs)
            .await?;

        let report_plans: Vec<(Section, SlideImage)> = summarized
            .sections
            .into_iter()
            .map(|section| {
                let image = section
                    .image_prompt
                    .clone()
                    .map(SlideImage::Generate)
                    .unwrap_or(SlideImage::None);
                (section, image)
            })
            .collect();

        let mut plans = if params.data_questions.is_empty() {
            report_plans
        } else {
            let mut data_plans = self.plan_data_sections(params).await;
            data_plans.extend(report_plans);
            data_plans
        };

        let requested = params.slide_count.clamp(1, MAX_SLIDE_COUNT);
        plans.truncate(requested);
        let actual = plans.len();
        if actual == 0 {
            return Ok(OrchestrateResult::default());
        }

        self.render_slides(&request_id, plans, params).await
    }

    /// Mixed mode (§4.11): one `data.query` per question, each becoming a
    /// section whose bullets are the insights and whose image is the
    /// already-rendered chart.
    async fn plan_data_sections(&self, params: &OrchestrateParams) -> Vec<(Section, SlideImage)> {
        let Some(data_query) = &self.data_query else {
            tracing::warn!("orchestrator: data_questions given but no data.query tool is configured, skipping");
            return Vec::new();
        };
        let Some(dataset_id) = &params.dataset_id else {
            tracing::warn!("orchestrator: data_questions given but no dataset_id, skipping");
            return Vec::new();
        };

        let mut plans = Vec::with_capacity(params.data_questions.len());
        for question in &params.data_questions {
            let outcome = data_query
                .query(&reportdeck_data::DataQueryParams {
                    dataset_id: dataset_id.clone(),
                    question: question.clone(),
                    sheet: None,
                    limit_rows: None,
                })
                .await;

            let mut section = Section {
                title: truncate_chars(question, MAX_TITLE_CHARS),
                subtitle: None,
                bullets: outcome.insights,
                script: outcome.table_md,
                image_prompt: None,
            };
            if let Err(e) = section.validate() {
                tracing::warn!(error = %e, question, "orchestrator: dropping data-question section that failed validation");
                continue;
            }
            let image = outcome.chart_png_path.map(SlideImage::Prebuilt).unwrap_or(SlideImage::None);
            plans.push((section, image));
        }
        plans
    }

    /// §4.11 steps 4-5: append one slide per plan, in order, onto the same
    /// presentation. Partial-failure policy per §4.11: image failure is
    /// swallowed; a deck-renderer failure on slide 1 is fatal, on slide
    /// `i>1` it stops the loop and reports `created_slides=i-1`.
    async fn render_slides(
        &self,
        request_id: &str,
        plans: Vec<(Section, SlideImage)>,
        params: &OrchestrateParams,
    ) -> Result<OrchestrateResult, Error> {
        let mut result = OrchestrateResult::default();

        for (i, (section, image_plan)) in plans.into_iter().enumerate() {
            let index = i + 1;
            let per_slide_id = IdempotencyStore::slide_key(request_id, index);

            let image = match image_plan {
                SlideImage::Prebuilt(path) => Some(ImageArtifact::Local { value: path }),
                SlideImage::Generate(prompt) => {
                    self.generate_image_cached(&prompt, params.use_cache, params.cache_ttl_secs).await
                }
                SlideImage::None => None,
            };
            let (image_local_path, image_url, image_handle) = split_artifact(image);

            let slide_params = SlidesCreateParams {
                client_request_id: Some(per_slide_id),
                title: section.title,
                subtitle: section.subtitle,
                bullets: section.bullets,
                script: section.script,
                image_local_path,
                image_url,
                image_handle,
                share_image_public: self.image_shared_public,
                aspect: self.image_aspect.clone(),
                presentation_id: result.presentation_id.clone(),
            };

            match self.slides.create_or_append(&slide_params).await {
                Ok(created) => {
                    if index == 1 {
                        result.presentation_id = Some(created.presentation_id.clone());
                        result.url = Some(created.url.clone());
                        result.first_slide_id = Some(created.slide_id.clone());
                    }
                    result.created_slides = index;
                }
                Err(e) if index == 1 => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, slide = index, "orchestrator: deck renderer failed, returning partial deck");
                    break;
                }
            }
        }

        Ok(result)
    }

    async fn summarize_cached(
        &self,
        report_text: &str,
        use_cache: bool,
        ttl_secs: i64,
    ) -> Result<reportdeck_domain::model::SummarizerOutput, Error> {
        let summarize_params = SummarizeParams {
            report_text: report_text.to_string(),
            max_bullets: self.max_bullets,
            max_script_chars: self.max_script_chars,
            max_sections: self.max_sections,
        };

        if !use_cache {
            return self.summarizer.summarize(&summarize_params).await;
        }

        let key = reportdeck_cache::summarizer_key(
            report_text,
            self.max_bullets,
            self.max_script_chars,
            &self.summarizer_model_id,
            self.max_sections,
        );
        if let Some(cached) = self.cache.get(SUMMARIZER_CACHE_NS, &key, ttl_secs) {
            match serde_json::from_value(cached) {
                Ok(out) => return Ok(out),
                Err(e) => tracing::warn!(error = %e, "orchestrator: discarding malformed cached summarizer output"),
            }
        }

        let out = self.summarizer.summarize(&summarize_params).await?;
        if let Ok(v) = serde_json::to_value(&out) {
            self.cache.set(SUMMARIZER_CACHE_NS, &key, v);
        }
        Ok(out)
    }

    /// §4.11 step 4b: best-effort, cached; any failure (including a
    /// cached-value that no longer deserializes) degrades to no image.
    async fn generate_image_cached(&self, prompt: &str, use_cache: bool, ttl_secs: i64) -> Option<ImageArtifact> {
        let image_params = ImageGenerateParams {
            prompt: prompt.to_string(),
            aspect: self.image_aspect.clone(),
            size: None,
            safety_tier: "default".to_string(),
            return_shared: self.image_shared_public,
        };

        if use_cache {
            let key = reportdeck_cache::image_key(prompt, &self.image_aspect, None, &self.image_model_id, self.image_shared_public);
            if let Some(cached) = self.cache.get(IMAGE_CACHE_NS, &key, ttl_secs) {
                if let Ok(artifact) = serde_json::from_value(cached) {
                    return Some(artifact);
                }
            }
            return match self.image.generate(&image_params).await {
                Ok(artifact) => {
                    if let Ok(v) = serde_json::to_value(&artifact) {
                        self.cache.set(IMAGE_CACHE_NS, &key, v);
                    }
                    Some(artifact)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "orchestrator: image generation failed, proceeding without an image");
                    None
                }
            };
        }

        match self.image.generate(&image_params).await {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!(error = %e, "orchestrator: image generation failed, proceeding without an image");
                None
            }
        }
    }
}

fn split_artifact(artifact: Option<ImageArtifact>) -> (Option<String>, Option<String>, Option<String>) {
    match artifact {
        None => (None, None, None),
        Some(ImageArtifact::Local { value }) => (Some(value), None, None),
        Some(ImageArtifact::Url { value }) => (None, Some(value), None),
        Some(ImageArtifact::Handle { value }) => (None, None, Some(value)),
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// `req-<sha256(text)[:16]>` (§4.11 batch mode).
pub fn deterministic_request_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("req-{}", &hex::encode(digest)[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportdeck_retry::RetryPolicy;
    use reportdeck_tools::mock::{MockDeckBackend, MockImageBackend, MockSummarizerBackend};

    fn summarizer_backend(n_sections: usize) -> Arc<MockSummarizerBackend> {
        let sections: Vec<_> = (0..n_sections)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Section {i}"),
                    "bullets": ["a", "b", "c"],
                    "script": "script",
                    "image_prompt": "a chart",
                })
            })
            .collect();
        let body = serde_json::json!({ "sections": sections }).to_string();
        Arc::new(MockSummarizerBackend::with_responses(vec![body]))
    }

    fn build_orchestrator(
        summarizer_backend: Arc<MockSummarizerBackend>,
        image_backend: Arc<MockImageBackend>,
        deck_backend: Arc<MockDeckBackend>,
        cache_dir: &std::path::Path,
    ) -> Orchestrator {
        let policy = RetryPolicy {
            attempts: 1,
            base: std::time::Duration::from_millis(1),
            cap: std::time::Duration::from_millis(1),
        };
        let idempotency = Arc::new(IdempotencyStore::new(cache_dir).unwrap());
        let summarizer = Arc::new(SummarizeTool::new(summarizer_backend, policy));
        let image = Arc::new(ImageGenerateTool::new(image_backend, policy, cache_dir.join("images")));
        let slides = Arc::new(SlidesCreateTool::new(deck_backend, idempotency, policy));
        let cache = Arc::new(reportdeck_cache::CacheStore::new(cache_dir.join("cache")));
        Orchestrator::new(summarizer, image, slides, None, cache, &Config::default())
    }

    #[tokio::test]
    async fn report_only_creates_one_slide_per_section() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build_orchestrator(
            summarizer_backend(3),
            Arc::new(MockImageBackend::with_images(vec![vec![1], vec![2], vec![3]])),
            Arc::new(MockDeckBackend::default()),
            dir.path(),
        );

        let result = orchestrator
            .orchestrate(&OrchestrateParams {
                report_text: "a long report".into(),
                client_request_id: Some("req-1".into()),
                slide_count: 10,
                use_cache: false,
                cache_ttl_secs: 3600,
                data_questions: Vec::new(),
                dataset_id: None,
            })
            .await
            .unwrap();

        assert_eq!(result.created_slides, 3);
        assert!(result.presentation_id.is_some());
        assert!(result.first_slide_id.is_some());
    }

    #[tokio::test]
    async fn slide_count_truncates_planned_sections() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build_orchestrator(
            summarizer_backend(5),
            Arc::new(MockImageBackend::with_images(vec![vec![1], vec![2]])),
            Arc::new(MockDeckBackend::default()),
            dir.path(),
        );

        let result = orchestrator
            .orchestrate(&OrchestrateParams {
                report_text: "report".into(),
                client_request_id: Some("req-2".into()),
                slide_count: 2,
                use_cache: false,
                cache_ttl_secs: 3600,
                data_questions: Vec::new(),
                dataset_id: None,
            })
            .await
            .unwrap();

        assert_eq!(result.created_slides, 2);
    }

    #[tokio::test]
    async fn image_failure_is_swallowed_and_slide_still_created() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build_orchestrator(
            summarizer_backend(1),
            Arc::new(MockImageBackend::with_generate_results(vec![Err(Error::backend_permanent("down"))])),
            Arc::new(MockDeckBackend::default()),
            dir.path(),
        );

        let result = orchestrator
            .orchestrate(&OrchestrateParams {
                report_text: "report".into(),
                client_request_id: Some("req-3".into()),
                slide_count: 1,
                use_cache: false,
                cache_ttl_secs: 3600,
                data_questions: Vec::new(),
                dataset_id: None,
            })
            .await
            .unwrap();

        assert_eq!(result.created_slides, 1);
    }

    #[tokio::test]
    async fn deck_renderer_failure_on_first_slide_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build_orchestrator(
            summarizer_backend(2),
            Arc::new(MockImageBackend::with_images(vec![vec![1], vec![2]])),
            Arc::new(MockDeckBackend::with_insert_failing_after(0)),
            dir.path(),
        );

        let err = orchestrator
            .orchestrate(&OrchestrateParams {
                report_text: "report".into(),
                client_request_id: Some("req-4".into()),
                slide_count: 2,
                use_cache: false,
                cache_ttl_secs: 3600,
                data_questions: Vec::new(),
                dataset_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, reportdeck_domain::ErrorKind::BackendPermanent);
    }

    #[tokio::test]
    async fn deck_renderer_failure_after_first_slide_returns_partial_deck() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build_orchestrator(
            summarizer_backend(3),
            Arc::new(MockImageBackend::with_images(vec![vec![1], vec![2], vec![3]])),
            Arc::new(MockDeckBackend::with_insert_failing_after(1)),
            dir.path(),
        );

        let result = orchestrator
            .orchestrate(&OrchestrateParams {
                report_text: "report".into(),
                client_request_id: Some("req-5".into()),
                slide_count: 3,
                use_cache: false,
                cache_ttl_secs: 3600,
                data_questions: Vec::new(),
                dataset_id: None,
            })
            .await
            .unwrap();

        assert_eq!(result.created_slides, 1);
        assert!(result.presentation_id.is_some());
    }

    #[tokio::test]
    async fn mixed_mode_prepends_data_question_sections() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let catalog = Arc::new(reportdeck_data::Catalog::new(&out_dir).unwrap());
        let dataset = catalog
            .ingest(b"company,total\nAcme,120.5\nGlobex,99.0\n", "report.csv")
            .unwrap();
        let data_summarizer = Arc::new(MockSummarizerBackend::with_responses(vec![]));
        let data_query = Arc::new(reportdeck_data::DataQueryTool::new(catalog, data_summarizer, out_dir.clone(), 1000, 1000));

        let policy = RetryPolicy {
            attempts: 1,
            base: std::time::Duration::from_millis(1),
            cap: std::time::Duration::from_millis(1),
        };
        let idempotency = Arc::new(IdempotencyStore::new(dir.path()).unwrap());
        let summarizer = Arc::new(SummarizeTool::new(summarizer_backend(1), policy));
        let image = Arc::new(ImageGenerateTool::new(
            Arc::new(MockImageBackend::with_images(vec![vec![1]])),
            policy,
            dir.path().join("images"),
        ));
        let slides = Arc::new(SlidesCreateTool::new(Arc::new(MockDeckBackend::default()), idempotency, policy));
        let cache = Arc::new(reportdeck_cache::CacheStore::new(dir.path().join("cache")));
        let orchestrator = Orchestrator::new(summarizer, image, slides, Some(data_query), cache, &Config::default());

        let result = orchestrator
            .orchestrate(&OrchestrateParams {
                report_text: "report".into(),
                client_request_id: Some("req-6".into()),
                slide_count: 10,
                use_cache: false,
                cache_ttl_secs: 3600,
                data_questions: vec!["total sales by company".into()],
                dataset_id: Some(dataset.dataset_id),
            })
            .await
            .unwrap();

        // one data-question slide plus one report slide
        assert_eq!(result.created_slides, 2);
    }

    #[tokio::test]
    async fn cache_hit_skips_summarizer_backend_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = summarizer_backend(1);
        let orchestrator = build_orchestrator(
            backend.clone(),
            Arc::new(MockImageBackend::with_images(vec![vec![1]])),
            Arc::new(MockDeckBackend::default()),
            dir.path(),
        );

        let params = OrchestrateParams {
            report_text: "same report".into(),
            client_request_id: Some("req-7".into()),
            slide_count: 1,
            use_cache: true,
            cache_ttl_secs: 3600,
            data_questions: Vec::new(),
            dataset_id: None,
        };
        orchestrator.orchestrate(&params).await.unwrap();
        assert_eq!(backend.call_count(), 1);

        // Second request with a fresh request id but the same report text
        // and cache params should hit the cache, not call the backend again.
        let mut second = params.clone();
        second.client_request_id = Some("req-8".into());
        let result = orchestrator.orchestrate(&second).await.unwrap();
        assert_eq!(result.created_slides, 1);
        assert_eq!(backend.call_count(), 1);
    }
}
