//! `slides.create` tool (C8, §4.8).
//!
//! Grounded in `mcp/tools/slides.py`: `_choose_image`'s exactly-one-of
//! check, the `title[: subtitle]` truncated-to-120 presentation title, and
//! the client-request-id idempotency dict (generalized here to the
//! durable [`IdempotencyStore`] so it survives restarts, per §4.4).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use reportdeck_domain::model::DeckRef;
use reportdeck_domain::Error;
use reportdeck_idempotency::IdempotencyStore;
use reportdeck_protocol::Tool;
use reportdeck_retry::{retry, retryable_by_kind, RetryPolicy};

use crate::backend::{DeckBackend, SlideContent};

const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlidesCreateParams {
    #[serde(default)]
    pub client_request_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub bullets: Vec<String>,
    pub script: String,
    #[serde(default)]
    pub image_local_path: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_handle: Option<String>,
    #[serde(default)]
    pub share_image_public: bool,
    #[serde(default = "default_aspect")]
    pub aspect: String,
    #[serde(default)]
    pub presentation_id: Option<String>,
}

fn default_aspect() -> String {
    "16:9".to_string()
}

#[derive(Debug, Serialize)]
pub struct SlidesCreateResult {
    pub presentation_id: String,
    pub slide_id: String,
    pub url: String,
    pub reused_existing: bool,
}

pub struct SlidesCreateTool {
    backend: Arc<dyn DeckBackend>,
    idempotency: Arc<IdempotencyStore>,
    policy: RetryPolicy,
}

impl SlidesCreateTool {
    pub fn new(backend: Arc<dyn DeckBackend>, idempotency: Arc<IdempotencyStore>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            idempotency,
            policy,
        }
    }

    /// §4.8 step 2: at most one image source.
    fn resolve_image_source(params: &SlidesCreateParams) -> Result<ImageSource, Error> {
        let provided = [
            params.image_local_path.is_some(),
            params.image_url.is_some(),
            params.image_handle.is_some(),
        ]
        .into_iter()
        .filter(|b| *b)
        .count();
        if provided > 1 {
            return Err(Error::bad_request(
                "provide exactly one of image_local_path, image_url, image_handle",
            ));
        }
        if let Some(path) = &params.image_local_path {
            return Ok(ImageSource::Local(path.clone()));
        }
        if let Some(url) = &params.image_url {
            return Ok(ImageSource::Url(url.clone()));
        }
        if let Some(handle) = &params.image_handle {
            return Ok(ImageSource::Handle(handle.clone()));
        }
        Ok(ImageSource::None)
    }

    async fn resolve_image_url(&self, source: ImageSource, share_public: bool) -> Result<Option<String>, Error> {
        match source {
            ImageSource::None => Ok(None),
            ImageSource::Url(url) => Ok(Some(url)),
            ImageSource::Handle(handle) => Ok(Some(format!(
                "https://drive.google.com/uc?export=download&id={handle}"
            ))),
            ImageSource::Local(path) => {
                let (handle, public_url) = retry(&self.policy, retryable_by_kind, |_attempt| {
                    self.backend.upload_image(&path, share_public)
                })
                .await?;
                Ok(Some(public_url.unwrap_or_else(|| {
                    format!("https://drive.google.com/uc?export=download&id={handle}")
                })))
            }
        }
    }

    pub async fn create_or_append(&self, params: &SlidesCreateParams) -> Result<SlidesCreateResult, Error> {
        if let Some(key) = &params.client_request_id {
            if let Some(deck) = self.idempotency.lookup(key) {
                let slide_id = deck.slide_ids.last().cloned().unwrap_or_default();
                return Ok(SlidesCreateResult {
                    presentation_id: deck.presentation_id,
                    slide_id,
                    url: deck.url,
                    reused_existing: true,
                });
            }
        }

        let image_source = Self::resolve_image_source(params)?;

        let (presentation_id, url) = match &params.presentation_id {
            Some(id) => (
                id.clone(),
                format!("https://slides.example/presentation/{id}"),
            ),
            None => {
                let full_title = match &params.subtitle {
                    Some(sub) if !sub.is_empty() => format!("{}: {sub}", params.title),
                    _ => params.title.clone(),
                };
                let truncated: String = full_title.chars().take(MAX_TITLE_CHARS).collect();
                let (presentation_id, url) = retry(&self.policy, retryable_by_kind, |_attempt| {
                    self.backend.create_presentation(&truncated)
                })
                .await?;
                if let Err(e) = self.backend.delete_first_slide(&presentation_id).await {
                    tracing::warn!(error = %e, %presentation_id, "failed to delete auto-created blank slide, continuing");
                }
                (presentation_id, url)
            }
        };

        let image_url = self.resolve_image_url(image_source, params.share_image_public).await?;

        let content = SlideContent {
            title: params.title.clone(),
            subtitle: params.subtitle.clone(),
            bullets: params.bullets.clone(),
            image_url,
        };
        let slide_id = retry(&self.policy, retryable_by_kind, |_attempt| {
            self.backend.insert_slide(&presentation_id, &content)
        })
        .await?;

        if let Err(e) = self.backend.set_speaker_notes(&presentation_id, &slide_id, &params.script).await {
            tracing::warn!(error = %e, %presentation_id, %slide_id, "speaker notes path failed, falling back to text box");
            self.backend
                .insert_fallback_script_textbox(&presentation_id, &slide_id, &params.script)
                .await?;
        }

        if let Some(key) = &params.client_request_id {
            let deck_ref = DeckRef {
                presentation_id: presentation_id.clone(),
                url: url.clone(),
                slide_ids: vec![slide_id.clone()],
            };
            self.idempotency.record(key, deck_ref)?;
        }

        Ok(SlidesCreateResult {
            presentation_id,
            slide_id,
            url,
            reused_existing: false,
        })
    }
}

enum ImageSource {
    None,
    Local(String),
    Url(String),
    Handle(String),
}

#[async_trait]
impl Tool for SlidesCreateTool {
    fn method_name(&self) -> &str {
        "slides.create"
    }

    async fn call(&self, params: Value) -> Result<Value, Error> {
        let params: SlidesCreateParams = serde_json::from_value(params)
            .map_err(|e| Error::bad_request(format!("invalid slides.create params: {e}")))?;
        let result = self.create_or_append(&params).await?;
        serde_json::to_value(result).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDeckBackend;

    fn base_params(client_request_id: Option<&str>) -> SlidesCreateParams {
        SlidesCreateParams {
            client_request_id: client_request_id.map(|s| s.to_string()),
            title: "Acme FinTech ETL modernization".into(),
            subtitle: Some("Quarterly update".into()),
            bullets: vec!["Cut infra costs".into(), "Unify pipelines".into()],
            script: "Short script.".into(),
            image_local_path: None,
            image_url: None,
            image_handle: None,
            share_image_public: true,
            aspect: "16:9".into(),
            presentation_id: None,
        }
    }

    #[tokio::test]
    async fn first_call_creates_presentation_and_slide() {
        let dir = tempfile::tempdir().unwrap();
        let idempotency = Arc::new(IdempotencyStore::new(dir.path()).unwrap());
        let backend = Arc::new(MockDeckBackend::default());
        let tool = SlidesCreateTool::new(backend, idempotency, RetryPolicy::default());
        let result = tool.create_or_append(&base_params(Some("req-123"))).await.unwrap();
        assert!(!result.reused_existing);
        assert!(!result.presentation_id.is_empty());
        assert!(!result.slide_id.is_empty());
    }

    #[tokio::test]
    async fn same_client_request_id_is_idempotent_with_no_new_backend_calls() {
        let dir = tempfile::tempdir().unwrap();
        let idempotency = Arc::new(IdempotencyStore::new(dir.path()).unwrap());
        let backend = Arc::new(MockDeckBackend::default());
        let tool = SlidesCreateTool::new(backend.clone(), idempotency, RetryPolicy::default());

        let first = tool.create_or_append(&base_params(Some("req-123"))).await.unwrap();
        let second = tool.create_or_append(&base_params(Some("req-123"))).await.unwrap();

        assert_eq!(first.presentation_id, second.presentation_id);
        assert_eq!(first.url, second.url);
        assert_eq!(first.slide_id, second.slide_id);
        assert!(!first.reused_existing);
        assert!(second.reused_existing);
        assert_eq!(backend.create_call_count(), 1);
        assert_eq!(backend.insert_call_count(), 1);
    }

    #[tokio::test]
    async fn more_than_one_image_source_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let idempotency = Arc::new(IdempotencyStore::new(dir.path()).unwrap());
        let backend = Arc::new(MockDeckBackend::default());
        let tool = SlidesCreateTool::new(backend, idempotency, RetryPolicy::default());
        let mut params = base_params(None);
        params.image_url = Some("https://x/y.png".into());
        params.image_handle = Some("abc".into());
        let err = tool.create_or_append(&params).await.unwrap_err();
        assert_eq!(err.kind, reportdeck_domain::ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn speaker_notes_failure_falls_back_to_textbox() {
        let dir = tempfile::tempdir().unwrap();
        let idempotency = Arc::new(IdempotencyStore::new(dir.path()).unwrap());
        let backend = Arc::new(MockDeckBackend::with_notes_failing());
        let tool = SlidesCreateTool::new(backend, idempotency, RetryPolicy::default());
        let result = tool.create_or_append(&base_params(None)).await.unwrap();
        assert!(!result.slide_id.is_empty());
    }

    #[tokio::test]
    async fn appends_to_existing_presentation_without_recreating() {
        let dir = tempfile::tempdir().unwrap();
        let idempotency = Arc::new(IdempotencyStore::new(dir.path()).unwrap());
        let backend = Arc::new(MockDeckBackend::default());
        let tool = SlidesCreateTool::new(backend.clone(), idempotency, RetryPolicy::default());

        let first = tool.create_or_append(&base_params(Some("req-a#s1"))).await.unwrap();
        let mut second_params = base_params(Some("req-a#s2"));
        second_params.presentation_id = Some(first.presentation_id.clone());
        let second = tool.create_or_append(&second_params).await.unwrap();

        assert_eq!(first.presentation_id, second.presentation_id);
        assert_ne!(first.slide_id, second.slide_id);
        assert_eq!(backend.create_call_count(), 1);
        assert_eq!(backend.insert_call_count(), 2);
    }
}
